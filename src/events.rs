//! Typed events published by the processing pipeline and the calibration
//! engine to CLI and presentation collaborators.

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationPoint, CalibrationResult, CalibrationState};
use crate::processing::{ProcessedSample, StatisticsSnapshot};

/// Events emitted by the data processing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ProcessorEvent {
    SampleProcessed(ProcessedSample),
    OutlierDetected(ProcessedSample),
    StatisticsUpdated(StatisticsSnapshot),
    ProcessingError {
        code: i32,
        message: String,
    },
    /// `true` when a calibration curve is active (grams), `false` for raw units.
    CalibrationStatusChanged {
        calibrated: bool,
    },
}

/// Events emitted by the calibration engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum CalibrationEvent {
    StateChanged(CalibrationState),
    PointCollected(CalibrationPoint),
    Progress { percent: u8, status: String },
    Completed(CalibrationResult),
    ReadingAdded { value: f64 },
    Error { code: i32, message: String },
}
