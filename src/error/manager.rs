// Manager lifecycle and channel error types

use log::error;
use thiserror::Error;

use crate::error::ErrorCode;

/// Manager error code constants
///
/// Error code range: 1001-1008
pub struct ManagerErrorCodes {}

impl ManagerErrorCodes {
    /// `start()` was called on a manager that is already running
    pub const ALREADY_STARTED: i32 = 1001;

    /// The manager was never started
    pub const NOT_STARTED: i32 = 1002;

    /// `start()` was called outside of a Tokio runtime
    pub const NO_RUNTIME: i32 = 1003;

    /// The worker side of the channel is gone
    pub const DISCONNECTED: i32 = 1004;

    /// The worker dropped the reply slot of a blocking instruction
    pub const REPLY_DROPPED: i32 = 1005;

    /// A blocking instruction did not receive its reply in time
    pub const REPLY_TIMEOUT: i32 = 1006;

    /// Mutex guarding the execution handle was poisoned
    pub const LOCK_POISONED: i32 = 1007;

    /// The dispatch task panicked or was cancelled
    pub const JOIN_FAILED: i32 = 1008;
}

/// Errors raised by the controller-side handle of a manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("manager '{manager}' already started")]
    AlreadyStarted { manager: &'static str },

    #[error("manager '{manager}' was never started")]
    NotStarted { manager: &'static str },

    #[error("manager '{manager}' must be started from within a Tokio runtime")]
    NoRuntime { manager: &'static str },

    #[error("manager '{manager}' is no longer receiving instructions")]
    Disconnected { manager: &'static str },

    #[error("manager '{manager}' dropped the reply to '{instruction}'")]
    ReplyDropped {
        manager: &'static str,
        instruction: &'static str,
    },

    #[error("manager '{manager}' did not reply to '{instruction}' within {timeout_ms}ms")]
    ReplyTimeout {
        manager: &'static str,
        instruction: &'static str,
        timeout_ms: u64,
    },

    #[error("lock poisoned for manager '{manager}'")]
    LockPoisoned { manager: &'static str },

    #[error("dispatch task of manager '{manager}' terminated abnormally: {reason}")]
    JoinFailed {
        manager: &'static str,
        reason: String,
    },
}

impl ErrorCode for ManagerError {
    fn code(&self) -> i32 {
        match self {
            ManagerError::AlreadyStarted { .. } => ManagerErrorCodes::ALREADY_STARTED,
            ManagerError::NotStarted { .. } => ManagerErrorCodes::NOT_STARTED,
            ManagerError::NoRuntime { .. } => ManagerErrorCodes::NO_RUNTIME,
            ManagerError::Disconnected { .. } => ManagerErrorCodes::DISCONNECTED,
            ManagerError::ReplyDropped { .. } => ManagerErrorCodes::REPLY_DROPPED,
            ManagerError::ReplyTimeout { .. } => ManagerErrorCodes::REPLY_TIMEOUT,
            ManagerError::LockPoisoned { .. } => ManagerErrorCodes::LOCK_POISONED,
            ManagerError::JoinFailed { .. } => ManagerErrorCodes::JOIN_FAILED,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

/// Log a manager error with structured context
///
/// Logs the numeric code alongside the message so failures seen by the
/// control surface can be matched with the worker-side log lines.
pub fn log_manager_error(err: &ManagerError, context: &str) {
    error!(
        "Manager error in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}
