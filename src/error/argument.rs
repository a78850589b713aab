// Control-surface argument error types

use thiserror::Error;

use crate::error::ErrorCode;

/// Argument error code constants
///
/// Error code range: 3001-3004
pub struct ArgumentErrorCodes {}

impl ArgumentErrorCodes {
    pub const MISSING: i32 = 3001;
    pub const UNEXPECTED: i32 = 3002;
    pub const INVALID: i32 = 3003;
    pub const REPEATED: i32 = 3004;
}

/// Invalid caller input at the control surface.
///
/// Always recovered by the HTTP layer into a 400 response; never reaches a
/// manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("missing required query argument '{name}'")]
    Missing { name: String },

    #[error("unexpected query argument '{name}'")]
    Unexpected { name: String },

    #[error("invalid value '{value}' for query argument '{name}': expected {expected}")]
    Invalid {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("query argument '{name}' given {count} times, expected once")]
    Repeated { name: String, count: usize },
}

impl ErrorCode for ArgumentError {
    fn code(&self) -> i32 {
        match self {
            ArgumentError::Missing { .. } => ArgumentErrorCodes::MISSING,
            ArgumentError::Unexpected { .. } => ArgumentErrorCodes::UNEXPECTED,
            ArgumentError::Invalid { .. } => ArgumentErrorCodes::INVALID,
            ArgumentError::Repeated { .. } => ArgumentErrorCodes::REPEATED,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}
