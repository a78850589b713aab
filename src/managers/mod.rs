// Managers Module
//
// Isolated concurrent workers, each owning private state and processing
// one strictly ordered instruction stream.
//
// - manager / channel: the dispatch loop, controller handle and message plumbing
// - PlaybackManager: mocked audio playback state
// - MotionManager: mocked motion sensor monitor
// - ExternalApiManager: mocked music-service client

pub mod channel;
pub mod external_api;
pub mod manager;
pub mod motion;
pub mod playback;

pub use channel::{Instruction, InstructionKind, Reply};
pub use external_api::{ExternalApi, ExternalApiInstruction, ExternalApiManager};
pub use manager::{Manager, ManagerClient, ManagerHandle};
pub use motion::{MotionInstruction, MotionManager, MotionMonitor, MotionObserver};
pub use playback::{Playback, PlaybackEvent, PlaybackInstruction, PlaybackManager, PlaybackStatus};
