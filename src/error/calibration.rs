// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;

/// Calibration error code constants
///
/// Error code range: 2001-2009
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Not enough calibration points for the requested fit
    pub const INSUFFICIENT_DATA: i32 = 2001;

    /// A point collection is already running
    pub const ALREADY_COLLECTING: i32 = 2002;

    /// Operation requires an active point collection
    pub const NOT_COLLECTING: i32 = 2003;

    /// Point has no steady-state readings
    pub const NO_READINGS: i32 = 2004;

    /// Regression system is singular or readings are degenerate
    pub const DEGENERATE_FIT: i32 = 2005;

    /// Steady-state collection exceeded the configured stall ceiling
    pub const COLLECTION_TIMEOUT: i32 = 2006;

    /// Operation not allowed in the current engine state
    pub const INVALID_STATE: i32 = 2007;

    /// Reading or writing a calibration file failed
    pub const PERSISTENCE: i32 = 2008;

    /// Calibration engine lock was poisoned
    pub const STATE_POISONED: i32 = 2009;
}

/// Log a calibration error with structured context
///
/// This function logs calibration errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// Calibration errors surface to the driving collaborator as explicit values;
/// none of them corrupt previously collected points.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    /// Fewer points than the fit requires
    #[error("Insufficient calibration data: need {required} points, got {collected}")]
    InsufficientData { required: usize, collected: usize },

    /// start_point_collection while a collection is running
    #[error("Point collection already in progress")]
    AlreadyCollecting,

    /// Collection-only operation outside of Collecting
    #[error("No point collection in progress")]
    NotCollecting,

    /// Completion requested before any steady-state reading arrived
    #[error("No steady-state readings collected for the current point")]
    NoReadings,

    /// Regression could not be solved
    #[error("Degenerate calibration fit: {reason}")]
    DegenerateFit { reason: String },

    /// Collection aborted after the stall ceiling
    #[error("Point collection timed out after {elapsed_secs:.1}s with {samples} samples")]
    CollectionTimeout { elapsed_secs: f64, samples: usize },

    /// Transition not allowed from the current state
    #[error("Invalid calibration state: {reason}")]
    InvalidState { reason: String },

    /// File I/O or (de)serialization failure
    #[error("Calibration persistence failed for {path}: {reason}")]
    Persistence { path: String, reason: String },

    /// Engine lock poisoned by a panicking holder
    #[error("Calibration state lock poisoned")]
    StatePoisoned,
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InsufficientData { .. } => CalibrationErrorCodes::INSUFFICIENT_DATA,
            CalibrationError::AlreadyCollecting => CalibrationErrorCodes::ALREADY_COLLECTING,
            CalibrationError::NotCollecting => CalibrationErrorCodes::NOT_COLLECTING,
            CalibrationError::NoReadings => CalibrationErrorCodes::NO_READINGS,
            CalibrationError::DegenerateFit { .. } => CalibrationErrorCodes::DEGENERATE_FIT,
            CalibrationError::CollectionTimeout { .. } => {
                CalibrationErrorCodes::COLLECTION_TIMEOUT
            }
            CalibrationError::InvalidState { .. } => CalibrationErrorCodes::INVALID_STATE,
            CalibrationError::Persistence { .. } => CalibrationErrorCodes::PERSISTENCE,
            CalibrationError::StatePoisoned => CalibrationErrorCodes::STATE_POISONED,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}
