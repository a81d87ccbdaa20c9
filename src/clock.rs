//! Time sources for the monitor core.
//!
//! Collection phases and telemetry timestamps read time through [`TimeSource`]
//! so tests and replays can drive the calibration protocol deterministically.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Trait representing a monotonic time source.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests and file replays.
pub struct ManualTimeSource {
    current: Mutex<Instant>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward by `step`; a step past the representable range
    /// leaves the clock unchanged.
    pub fn advance(&self, step: Duration) {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        match guard.checked_add(step) {
            Some(next) => *guard = next,
            None => log::warn!("[ManualTimeSource] Ignoring out-of-range step {:?}", step),
        }
    }

    /// Move the clock forward by `secs`; negative or NaN values are ignored
    /// since the clock never runs backwards.
    pub fn advance_secs(&self, secs: f64) {
        if !(secs > 0.0) {
            return;
        }
        self.advance(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX));
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Wall-clock seconds since the unix epoch, as stored in calibration files.
pub fn now_unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
