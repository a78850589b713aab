// Error types for the symfopi controller
//
// Manager lifecycle/channel failures, instruction dispatch failures, and
// control-surface argument failures each get their own enum with a stable
// numeric code range so log lines and HTTP bodies can be correlated.

mod argument;
mod dispatch;
mod manager;

pub use argument::{ArgumentError, ArgumentErrorCodes};
pub use dispatch::{log_dispatch_error, DispatchError, DispatchErrorCodes};
pub use manager::{log_manager_error, ManagerError, ManagerErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent logging and HTTP mapping.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
