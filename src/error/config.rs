// Configuration error types and constants

use crate::error::ErrorCode;

/// Configuration error code constants
///
/// Error code range: 3001-3005
pub struct ConfigErrorCodes {}

impl ConfigErrorCodes {
    pub const INVALID_BAUDRATE: i32 = 3001;
    pub const INVALID_TIMEOUT: i32 = 3002;
    pub const INVALID_PARAMETER: i32 = 3003;
    pub const IO: i32 = 3004;
    pub const PARSE: i32 = 3005;
}

/// Configuration errors
///
/// Raised when a config struct is built or loaded, never when it is used.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Baudrate must be positive (got {baudrate})")]
    InvalidBaudrate { baudrate: i64 },

    #[error("Timeout cannot be negative (got {timeout})")]
    InvalidTimeout { timeout: f64 },

    #[error("Invalid value for {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("Failed to access config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config {path}: {reason}")]
    Parse { path: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::InvalidBaudrate { .. } => ConfigErrorCodes::INVALID_BAUDRATE,
            ConfigError::InvalidTimeout { .. } => ConfigErrorCodes::INVALID_TIMEOUT,
            ConfigError::InvalidParameter { .. } => ConfigErrorCodes::INVALID_PARAMETER,
            ConfigError::Io { .. } => ConfigErrorCodes::IO,
            ConfigError::Parse { .. } => ConfigErrorCodes::PARSE,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}
