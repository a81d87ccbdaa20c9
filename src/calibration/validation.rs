// Advisory validation of fitted calibration curves
//
// A failed check never discards the result. It is reported through
// `validation_passed` so the operator can accept the curve anyway or re-run.

use crate::calibration::{CalibrationMethod, CalibrationResult};

/// Minimum acceptable coefficient of determination
pub const MIN_R_SQUARED: f64 = 0.95;

/// Maximum acceptable root mean squared error (g)
pub const MAX_RMSE: f64 = 0.1;

/// A single failed validation criterion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationIssue {
    LowRSquared { r_squared: f64 },
    HighRmse { rmse: f64 },
    NonPositiveSlope { slope: f64 },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::LowRSquared { r_squared } => {
                write!(f, "R² too low: {:.6} < {}", r_squared, MIN_R_SQUARED)
            }
            ValidationIssue::HighRmse { rmse } => {
                write!(f, "RMSE too high: {:.6} > {}", rmse, MAX_RMSE)
            }
            ValidationIssue::NonPositiveSlope { slope } => {
                write!(f, "Slope is zero or negative: {:.6}", slope)
            }
        }
    }
}

/// Validator for fitted calibration curves
pub struct ResultValidator;

impl ResultValidator {
    /// Collect every failed criterion
    ///
    /// # Validation Rules
    /// * R² must be at least [`MIN_R_SQUARED`]
    /// * RMSE must not exceed [`MAX_RMSE`]
    /// * Linear curves must have a positive slope
    pub fn issues(result: &CalibrationResult) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if !(result.r_squared >= MIN_R_SQUARED) {
            issues.push(ValidationIssue::LowRSquared {
                r_squared: result.r_squared,
            });
        }
        if !(result.rmse <= MAX_RMSE) {
            issues.push(ValidationIssue::HighRmse { rmse: result.rmse });
        }
        if result.method == CalibrationMethod::Linear {
            let slope = result.slope().unwrap_or(0.0);
            if slope <= 0.0 {
                issues.push(ValidationIssue::NonPositiveSlope { slope });
            }
        }

        issues
    }

    /// Run every check, logging one warning per failure
    pub fn validate(result: &CalibrationResult) -> bool {
        let issues = Self::issues(result);
        for issue in &issues {
            log::warn!("[CalibrationEngine] Validation failed: {}", issue);
        }
        issues.is_empty()
    }
}
