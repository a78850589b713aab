// Instruction dispatch error types

use log::error;
use thiserror::Error;

use crate::error::ErrorCode;

/// Dispatch error code constants
///
/// Error code range: 2001-2003
pub struct DispatchErrorCodes {}

impl DispatchErrorCodes {
    /// Instruction name does not resolve to a handler
    pub const UNKNOWN_INSTRUCTION: i32 = 2001;

    /// Positional arguments do not match the handler signature
    pub const INVALID_ARGUMENTS: i32 = 2002;

    /// Handler body panicked while executing
    pub const HANDLER_PANICKED: i32 = 2003;
}

/// Failures raised inside a manager's dispatch loop.
///
/// These never cross back over the channel; the loop logs them, drops the
/// offending instruction, and keeps serving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("manager '{manager}' has no handler named '{name}'")]
    UnknownInstruction { manager: &'static str, name: String },

    #[error("invalid arguments for '{name}' on manager '{manager}': {reason}")]
    InvalidArguments {
        manager: &'static str,
        name: String,
        reason: String,
    },

    #[error("handler '{name}' on manager '{manager}' panicked: {reason}")]
    HandlerPanicked {
        manager: &'static str,
        name: String,
        reason: String,
    },
}

impl ErrorCode for DispatchError {
    fn code(&self) -> i32 {
        match self {
            DispatchError::UnknownInstruction { .. } => DispatchErrorCodes::UNKNOWN_INSTRUCTION,
            DispatchError::InvalidArguments { .. } => DispatchErrorCodes::INVALID_ARGUMENTS,
            DispatchError::HandlerPanicked { .. } => DispatchErrorCodes::HANDLER_PANICKED,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

/// Log a dispatch error with structured context
pub fn log_dispatch_error(err: &DispatchError, context: &str) {
    error!(
        "Dispatch error in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}
