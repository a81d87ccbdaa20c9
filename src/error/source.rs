// Sample source error types

use crate::error::ErrorCode;

/// Sample source error code constants
///
/// Error code range: 4001-4003
pub struct SourceErrorCodes {}

impl SourceErrorCodes {
    pub const IO: i32 = 4001;
    pub const ALREADY_RUNNING: i32 = 4002;
    pub const NOT_RUNNING: i32 = 4003;
}

/// Errors reported by raw sample sources
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("Sample source I/O failure on {source_name}: {reason}")]
    Io { source_name: String, reason: String },

    #[error("Sample source already running")]
    AlreadyRunning,

    #[error("Sample source not running")]
    NotRunning,
}

impl ErrorCode for SourceError {
    fn code(&self) -> i32 {
        match self {
            SourceError::Io { .. } => SourceErrorCodes::IO,
            SourceError::AlreadyRunning => SourceErrorCodes::ALREADY_RUNNING,
            SourceError::NotRunning => SourceErrorCodes::NOT_RUNNING,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}
