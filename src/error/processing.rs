// Processing error types and constants

use crate::error::ErrorCode;
use log::warn;

/// Processing error code constants
///
/// Error code range: 1001-1002
pub struct ProcessingErrorCodes {}

impl ProcessingErrorCodes {
    /// Raw line could not be parsed into a finite float
    pub const PARSE: i32 = 1001;

    /// Configuration rejected while the pipeline was running
    pub const CONFIG_REJECTED: i32 = 1002;
}

/// Log a per-sample processing error
///
/// Sample-level failures are recoverable, so they are logged at warn level
/// and never escalate beyond the offending sample.
pub fn log_processing_error(err: &ProcessingError, context: &str) {
    warn!(
        "Processing error in {}: code={}, component=DataProcessor, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while turning a raw line into a processed sample
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessingError {
    /// Malformed raw input; the sample is dropped and the feed continues
    #[error("Failed to parse raw value {input:?}: {reason}")]
    Parse { input: String, reason: String },

    /// A replacement configuration failed validation
    #[error("Configuration rejected: {reason}")]
    ConfigRejected { reason: String },
}

impl ErrorCode for ProcessingError {
    fn code(&self) -> i32 {
        match self {
            ProcessingError::Parse { .. } => ProcessingErrorCodes::PARSE,
            ProcessingError::ConfigRejected { .. } => ProcessingErrorCodes::CONFIG_REJECTED,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_code_and_message() {
        let err = ProcessingError::Parse {
            input: "12a".to_string(),
            reason: "invalid float literal".to_string(),
        };
        assert_eq!(err.code(), ProcessingErrorCodes::PARSE);
        assert!(err.message().contains("12a"));
        assert!(err.message().contains("invalid float literal"));
    }

    #[test]
    fn test_config_rejected_code() {
        let err = ProcessingError::ConfigRejected {
            reason: "filter_window must be >= 2".to_string(),
        };
        assert_eq!(err.code(), 1002);
    }
}
