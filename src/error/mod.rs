// Error types for the scale monitor core
//
// This module defines the error taxonomy for sample processing, calibration,
// configuration and sample sources. Every error carries a stable numeric code
// so collaborators (CLI, UI bridges) can react without string matching.

mod calibration;
mod config;
mod processing;
mod source;

pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use config::{ConfigError, ConfigErrorCodes};
pub use processing::{log_processing_error, ProcessingError, ProcessingErrorCodes};
pub use source::{SourceError, SourceErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// collaborator boundaries.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
