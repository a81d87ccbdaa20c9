// CollectionSession - explicit phase state for one point collection
//
// A session exists only while the engine is `Collecting`. All phase data
// (stabilization start, steady-state start, outlier context) lives here, so
// the engine can match on the phase exhaustively.

use std::collections::VecDeque;
use std::time::Instant;

use crate::calibration::progress::CollectionPhase;
use crate::calibration::CalibrationPoint;
use crate::processing::quality::is_outlier;

/// Readings kept as outlier context
pub const RECENT_READINGS_LEN: usize = 50;

/// Buffered readings required before the stabilization outlier gate applies
pub const STABILIZATION_OUTLIER_MIN: usize = 20;

/// Multiplier applied to the configured outlier threshold during calibration
pub const OUTLIER_RELAXATION: f64 = 3.0;

/// Phase with the instant it began
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionPhase {
    Stabilizing { started_at: Instant },
    SteadyState { started_at: Instant },
}

/// Why a reading was not counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingOutcome {
    /// Buffered while the weight settles
    Buffered,
    /// Counted toward the point
    Accepted,
    /// Rejected by the relaxed outlier gate
    Outlier,
}

#[derive(Debug, Clone)]
pub struct CollectionSession {
    pub target_weight: f64,
    pub phase: SessionPhase,
    /// Outlier context spanning both phases
    pub recent: VecDeque<f64>,
    pub point: CalibrationPoint,
    /// Set once the hard deadline passed without enough readings
    pub stall_warned: bool,
}

impl CollectionSession {
    pub fn new(target_weight: f64, started_at: Instant, collection_time: f64) -> Self {
        Self {
            target_weight,
            phase: SessionPhase::Stabilizing { started_at },
            recent: VecDeque::with_capacity(RECENT_READINGS_LEN),
            point: CalibrationPoint::new(target_weight, collection_time),
            stall_warned: false,
        }
    }

    pub fn phase_kind(&self) -> CollectionPhase {
        match self.phase {
            SessionPhase::Stabilizing { .. } => CollectionPhase::Stabilizing,
            SessionPhase::SteadyState { .. } => CollectionPhase::SteadyState,
        }
    }

    /// Readings counted toward the point
    pub fn sample_count(&self) -> usize {
        self.point.sensor_readings.len()
    }

    /// Seconds since the current phase began
    pub fn phase_elapsed(&self, now: Instant) -> f64 {
        let started_at = match self.phase {
            SessionPhase::Stabilizing { started_at } | SessionPhase::SteadyState { started_at } => {
                started_at
            }
        };
        now.saturating_duration_since(started_at).as_secs_f64()
    }

    /// Route one raw reading through the relaxed outlier gate
    pub fn add_reading(&mut self, value: f64, outlier_threshold: f64) -> ReadingOutcome {
        let threshold = outlier_threshold * OUTLIER_RELAXATION;
        let gate_active = match self.phase {
            SessionPhase::Stabilizing { .. } => self.recent.len() >= STABILIZATION_OUTLIER_MIN,
            SessionPhase::SteadyState { .. } => true,
        };
        if gate_active && is_outlier(value, self.recent.make_contiguous(), threshold) {
            return ReadingOutcome::Outlier;
        }

        if self.recent.len() == RECENT_READINGS_LEN {
            self.recent.pop_front();
        }
        self.recent.push_back(value);

        match self.phase {
            SessionPhase::Stabilizing { .. } => ReadingOutcome::Buffered,
            SessionPhase::SteadyState { .. } => {
                self.point.sensor_readings.push(value);
                ReadingOutcome::Accepted
            }
        }
    }

    /// Discard settling readings and start counting
    pub fn enter_steady_state(&mut self, now: Instant) {
        self.point.sensor_readings.clear();
        self.phase = SessionPhase::SteadyState { started_at: now };
    }
}
