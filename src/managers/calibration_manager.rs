// CalibrationManager: Focused manager for the calibration workflow
//
// Single Responsibility: thread-safe ownership of the CalibrationEngine plus
// calibration file persistence. The engine itself is single-owner; this
// wrapper lets the monitor worker (ticks, readings) and the control surface
// (CLI, callers of MonitorHandle) share it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::calibration::{
    load_calibration, save_calibration, CalibrationEngine, CalibrationMethod, CalibrationPoint,
    CalibrationProgress, CalibrationResult, CalibrationState,
};
use crate::clock::TimeSource;
use crate::config::CollectionConfig;
use crate::error::{log_calibration_error, CalibrationError};
use crate::events::CalibrationEvent;

/// Manages the calibration engine and calibration persistence
///
/// State violations reported by the engine as `false` are turned into
/// `CalibrationError` values here so the control surface can report them.
///
/// # Example
/// ```ignore
/// let manager = CalibrationManager::new(CollectionConfig::default(), clock);
/// manager.start(&[0.0, 100.0, 200.0])?;
/// manager.start_point_collection(0.0)?;
/// // ... feed readings, tick until the point completes ...
/// let result = manager.calculate(CalibrationMethod::Linear)?;
/// ```
pub struct CalibrationManager {
    engine: Arc<Mutex<CalibrationEngine>>,
}

impl CalibrationManager {
    pub fn new(config: CollectionConfig, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(CalibrationEngine::new(config, time_source))),
        }
    }

    /// Route engine events to `tx`
    pub fn set_event_sender(
        &self,
        tx: broadcast::Sender<CalibrationEvent>,
    ) -> Result<(), CalibrationError> {
        self.lock_engine()?.set_event_sender(tx);
        Ok(())
    }

    /// Replace collection parameters; rejected while a point is collecting
    pub fn update_config(&self, config: CollectionConfig) -> Result<(), CalibrationError> {
        self.lock_engine()?
            .update_config(config)
            .inspect_err(|err| log_calibration_error(err, "update_config"))
    }

    /// Shared handle for the monitor worker
    pub fn get_engine_arc(&self) -> Arc<Mutex<CalibrationEngine>> {
        Arc::clone(&self.engine)
    }

    // ========================================================================
    // WORKFLOW
    // ========================================================================

    /// Begin a calibration run over the planned reference weights
    ///
    /// # Errors
    /// - `AlreadyCollecting` while a point collection or fit is running
    /// - Lock poisoning on the engine
    pub fn start(&self, reference_weights: &[f64]) -> Result<(), CalibrationError> {
        let mut engine = self.lock_engine()?;
        if !engine.start_calibration(reference_weights) {
            let err = CalibrationError::AlreadyCollecting;
            log_calibration_error(&err, "start_calibration");
            return Err(err);
        }
        Ok(())
    }

    pub fn start_point_collection(&self, reference_weight: f64) -> Result<(), CalibrationError> {
        let mut engine = self.lock_engine()?;
        if !engine.start_point_collection(reference_weight) {
            let err = CalibrationError::AlreadyCollecting;
            log_calibration_error(&err, "start_point_collection");
            return Err(err);
        }
        Ok(())
    }

    /// Feed one sensor reading; `Ok(false)` when it was not taken
    pub fn add_reading(&self, value: f64) -> Result<bool, CalibrationError> {
        Ok(self.lock_engine()?.add_sensor_reading(value))
    }

    /// Run one periodic progress check
    pub fn tick(&self) -> Result<Option<CalibrationPoint>, CalibrationError> {
        self.lock_engine()?.tick()
    }

    /// Finish the running point early with what was collected so far
    pub fn complete_point(&self) -> Result<(), CalibrationError> {
        let mut engine = self.lock_engine()?;
        if !engine.is_collecting() {
            let err = CalibrationError::NotCollecting;
            log_calibration_error(&err, "complete_point");
            return Err(err);
        }
        if !engine.complete_current_point() {
            let err = CalibrationError::NoReadings;
            log_calibration_error(&err, "complete_point");
            return Err(err);
        }
        Ok(())
    }

    pub fn calculate(&self, method: CalibrationMethod) -> Result<CalibrationResult, CalibrationError> {
        self.lock_engine()?
            .calculate_calibration(method)
            .inspect_err(|err| log_calibration_error(err, "calculate_calibration"))
    }

    pub fn select_best(&self) -> Result<CalibrationResult, CalibrationError> {
        self.lock_engine()?
            .select_best_method()
            .inspect_err(|err| log_calibration_error(err, "select_best_method"))
    }

    pub fn skip_step(&self) -> Result<bool, CalibrationError> {
        Ok(self.lock_engine()?.skip_current_step())
    }

    pub fn cancel(&self) -> Result<(), CalibrationError> {
        self.lock_engine()?.cancel_calibration();
        Ok(())
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn state(&self) -> Result<CalibrationState, CalibrationError> {
        Ok(self.lock_engine()?.state())
    }

    pub fn is_collecting(&self) -> Result<bool, CalibrationError> {
        Ok(self.lock_engine()?.is_collecting())
    }

    pub fn progress(&self) -> Result<CalibrationProgress, CalibrationError> {
        Ok(self.lock_engine()?.get_progress())
    }

    pub fn next_reference_weight(&self) -> Result<Option<f64>, CalibrationError> {
        Ok(self.lock_engine()?.next_reference_weight())
    }

    pub fn last_result(&self) -> Result<Option<CalibrationResult>, CalibrationError> {
        Ok(self.lock_engine()?.last_result().cloned())
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Save the most recent fit
    ///
    /// # Errors
    /// - `InvalidState` when no calibration has been calculated yet
    /// - `Persistence` on I/O or serialization failure
    pub fn save_result<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let result = self.last_result()?.ok_or_else(|| {
            let err = CalibrationError::InvalidState {
                reason: "no calibration result to save".to_string(),
            };
            log_calibration_error(&err, "save_calibration");
            err
        })?;
        save_calibration(&result, path)
            .inspect_err(|err| log_calibration_error(err, "save_calibration"))
    }

    /// Load a calibration file without touching the engine's own state
    pub fn load_result<P: AsRef<Path>>(&self, path: P) -> Result<CalibrationResult, CalibrationError> {
        load_calibration(path).inspect_err(|err| log_calibration_error(err, "load_calibration"))
    }

    // ========================================================================
    // HELPER METHODS - Lock management
    // ========================================================================

    /// Safely acquire the engine lock
    fn lock_engine(&self) -> Result<MutexGuard<'_, CalibrationEngine>, CalibrationError> {
        self.engine.lock().map_err(|_| CalibrationError::StatePoisoned)
    }
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new(
            CollectionConfig::default(),
            Arc::new(crate::clock::SystemTimeSource::default()),
        )
    }
}
