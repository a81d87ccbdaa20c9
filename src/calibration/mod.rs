// Calibration module - multi-point sensor calibration
//
// This module provides the pieces of the calibration workflow:
// 1. CalibrationEngine: state machine collecting one point per reference weight
// 2. Regression: linear and polynomial least-squares fits of weight vs reading
// 3. CalibrationResult: the fitted curve, applied by the data processor
// 4. Persistence: JSON save/load of a finished calibration
//
// The calibration workflow:
// 1. Start a calibration with the planned reference weights
// 2. For each weight, collect a point (stabilize, then steady-state readings)
// 3. Fit a curve and validate it before handing it to the processor

pub mod engine;
pub mod persistence;
pub mod point;
pub mod progress;
pub mod regression;
pub mod result;
pub mod session;
pub mod validation;

pub use engine::{cumulative_weights, CalibrationEngine};
pub use persistence::{load_calibration, save_calibration};
pub use point::{CalibrationPoint, PointGrade};
pub use progress::{CalibrationProgress, CalibrationState, CollectionPhase};
pub use result::{CalibrationInfo, CalibrationMethod, CalibrationResult, QualityGrade};
pub use validation::{ResultValidator, ValidationIssue};
