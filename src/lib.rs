// symfopi - motion-aware music playback controller
// Three independently running managers coordinated by a supervisor and
// driven over an HTTP control surface.

pub mod config;
pub mod error;
pub mod http;
pub mod managers;
pub mod supervisor;

pub use config::AppConfig;
pub use supervisor::{run, CurrentPlaylist, Supervisor};

