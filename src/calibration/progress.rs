// Progress tracking for the calibration workflow
//
// Types reported to collaborators while the engine collects points.

use serde::{Deserialize, Serialize};

/// Calibration engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    Idle,
    Collecting,
    Processing,
    Completed,
    Error,
}

impl CalibrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationState::Idle => "idle",
            CalibrationState::Collecting => "collecting",
            CalibrationState::Processing => "processing",
            CalibrationState::Completed => "completed",
            CalibrationState::Error => "error",
        }
    }
}

impl std::fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-phase of a running point collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionPhase {
    /// Weight settling; readings are buffered and later discarded
    Stabilizing,
    /// Readings count toward the point
    SteadyState,
}

/// Progress information for the current calibration step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    pub state: CalibrationState,
    /// Present while a point is being collected
    pub phase: Option<CollectionPhase>,
    /// Percent of the current phase elapsed (0-100)
    pub percent: u8,
    pub status: String,
    /// Reference weight of the point being collected
    pub target_weight: Option<f64>,
    /// Steady-state readings accepted so far
    pub samples_collected: usize,
    pub samples_needed: usize,
    /// Planned steps already completed or skipped
    pub steps_completed: usize,
    pub total_steps: usize,
    pub points_collected: usize,
}

impl CalibrationProgress {
    /// Check if every planned step has been handled
    pub fn is_plan_complete(&self) -> bool {
        self.total_steps > 0 && self.steps_completed >= self.total_steps
    }
}

/// Percent of `elapsed` over `duration`, saturating at 100
pub(crate) fn phase_percent(elapsed: f64, duration: f64) -> u8 {
    if duration <= 0.0 {
        return 100;
    }
    ((elapsed / duration) * 100.0).clamp(0.0, 100.0) as u8
}
