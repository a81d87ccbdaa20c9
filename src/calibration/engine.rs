// CalibrationEngine - multi-point calibration state machine
//
// States: Idle -> Collecting -> Idle (per point), Idle -> Processing ->
// Completed (fit), Error on an unrecoverable failure, and back to Idle on
// cancel.
//
// The engine collects one point per `start_point_collection` call and never
// advances to the next reference weight on its own; the driving collaborator
// (wizard, CLI) paces each step. A collection runs two sub-phases on the
// periodic `tick`:
// 1. Stabilization: readings are buffered for outlier context, then dropped
// 2. Steady state: readings accumulate until both the duration and the
//    minimum sample count are reached, with a forced completion after twice
//    the duration when at least 10 readings exist

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::calibration::progress::{phase_percent, CalibrationProgress, CalibrationState};
use crate::calibration::regression;
use crate::calibration::session::{CollectionSession, ReadingOutcome, SessionPhase};
use crate::calibration::validation::ResultValidator;
use crate::calibration::{CalibrationMethod, CalibrationPoint, CalibrationResult};
use crate::clock::{now_unix_seconds, SystemTimeSource, TimeSource};
use crate::config::CollectionConfig;
use crate::error::{log_calibration_error, CalibrationError, ErrorCode};
use crate::events::CalibrationEvent;

/// Readings required for a forced completion at the hard deadline
pub const FORCE_COMPLETE_MIN_SAMPLES: usize = 10;

/// Points required by any fit
pub const MIN_CALIBRATION_POINTS: usize = 2;

/// Weight on RMSE when ranking validated fits
const RMSE_PENALTY: f64 = 0.1;

/// Convert per-step added weights into cumulative reference weights
///
/// The first step is always the zero point; its entry is ignored.
pub fn cumulative_weights(individual: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    individual
        .iter()
        .enumerate()
        .map(|(i, w)| {
            if i > 0 {
                total += w;
            }
            (total * 100.0).round() / 100.0
        })
        .collect()
}

/// CalibrationEngine collects points and fits the calibration curve
pub struct CalibrationEngine {
    config: CollectionConfig,
    state: CalibrationState,
    points: Vec<CalibrationPoint>,
    session: Option<CollectionSession>,
    planned_weights: Vec<f64>,
    current_step: usize,
    last_result: Option<CalibrationResult>,
    time_source: Arc<dyn TimeSource>,
    events: Option<broadcast::Sender<CalibrationEvent>>,
}

impl CalibrationEngine {
    /// Create an engine reading time from `time_source`
    pub fn new(config: CollectionConfig, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            config,
            state: CalibrationState::Idle,
            points: Vec::new(),
            session: None,
            planned_weights: Vec::new(),
            current_step: 0,
            last_result: None,
            time_source,
            events: None,
        }
    }

    /// Create with default configuration and the system clock
    pub fn new_default() -> Self {
        Self::new(
            CollectionConfig::default(),
            Arc::new(SystemTimeSource::default()),
        )
    }

    /// Publish events on `tx`
    pub fn set_event_sender(&mut self, tx: broadcast::Sender<CalibrationEvent>) {
        self.events = Some(tx);
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Replace the collection configuration; rejected while collecting
    pub fn update_config(&mut self, config: CollectionConfig) -> Result<(), CalibrationError> {
        if self.state == CalibrationState::Collecting {
            return Err(CalibrationError::AlreadyCollecting);
        }
        self.config = config;
        Ok(())
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn last_result(&self) -> Option<&CalibrationResult> {
        self.last_result.as_ref()
    }

    pub fn is_collecting(&self) -> bool {
        self.state == CalibrationState::Collecting && self.session.is_some()
    }

    // ========================================================================
    // WORKFLOW
    // ========================================================================

    /// Begin a calibration run over `reference_weights`
    ///
    /// Clears previously collected points. The engine stays `Idle`; each step
    /// is started explicitly with [`start_point_collection`](Self::start_point_collection).
    ///
    /// # Returns
    /// * `true` - Calibration started
    /// * `false` - A collection or fit is in progress
    pub fn start_calibration(&mut self, reference_weights: &[f64]) -> bool {
        if matches!(
            self.state,
            CalibrationState::Collecting | CalibrationState::Processing
        ) {
            log::warn!(
                "[CalibrationEngine] Calibration already in progress (state={})",
                self.state
            );
            return false;
        }

        self.points.clear();
        self.session = None;
        self.planned_weights = reference_weights.to_vec();
        self.current_step = 0;
        self.last_result = None;
        self.set_state(CalibrationState::Idle);

        log::info!(
            "[CalibrationEngine] Calibration started: {} steps",
            reference_weights.len()
        );
        true
    }

    /// Start collecting a point at `reference_weight`
    ///
    /// # Returns
    /// * `true` - Stabilization started
    /// * `false` - A collection is already running
    pub fn start_point_collection(&mut self, reference_weight: f64) -> bool {
        if self.is_collecting() {
            log::warn!("[CalibrationEngine] Collection is already in progress");
            return false;
        }

        let now = self.time_source.now();
        self.session = Some(CollectionSession::new(
            reference_weight,
            now,
            now_unix_seconds(),
        ));
        self.set_state(CalibrationState::Collecting);

        log::info!(
            "[CalibrationEngine] Point collection started: {}g (waiting for stabilization...)",
            reference_weight
        );
        self.emit_progress(0, format!("Stabilizing... {}g", reference_weight));
        true
    }

    /// Offer one raw sensor reading to the running collection
    ///
    /// Ignored outside of `Collecting`.
    ///
    /// # Returns
    /// * `true` - Reading buffered or counted
    /// * `false` - No collection, or rejected as an outlier
    pub fn add_sensor_reading(&mut self, value: f64) -> bool {
        if self.state != CalibrationState::Collecting {
            return false;
        }
        let threshold = self.config.outlier_threshold;
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        match session.add_reading(value, threshold) {
            ReadingOutcome::Outlier => {
                log::debug!("[CalibrationEngine] Outlier removed: {}", value);
                false
            }
            ReadingOutcome::Buffered | ReadingOutcome::Accepted => {
                self.emit(CalibrationEvent::ReadingAdded { value });
                true
            }
        }
    }

    /// Advance the running collection; called periodically
    ///
    /// # Returns
    /// * `Ok(Some(point))` - The point completed on this tick
    /// * `Ok(None)` - Nothing completed
    /// * `Err(CollectionTimeout)` - The configured stall ceiling was hit
    pub fn tick(&mut self) -> Result<Option<CalibrationPoint>, CalibrationError> {
        if self.state != CalibrationState::Collecting {
            return Ok(None);
        }
        let now = self.time_source.now();
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        let elapsed = session.phase_elapsed(now);
        let target = session.target_weight;

        if let SessionPhase::Stabilizing { .. } = session.phase {
            let buffered = session.recent.len();
            let percent = phase_percent(elapsed, self.config.stabilization_time);
            let stabilized = elapsed >= self.config.stabilization_time;
            if stabilized {
                session.enter_steady_state(now);
            }

            self.emit_progress(
                percent,
                format!(
                    "Stabilizing... {}g ({} samples, {:.1}s)",
                    target, buffered, elapsed
                ),
            );
            if stabilized {
                log::info!(
                    "[CalibrationEngine] Stabilization completed, starting actual collection: {}g",
                    target
                );
                self.emit_progress(0, format!("Collecting... {}g", target));
            }
            return Ok(None);
        }

        let count = session.sample_count();
        let duration = self.config.collection_duration;
        let percent = phase_percent(elapsed, duration);
        self.emit_progress(
            percent,
            format!(
                "Collecting... {}g ({}/{} samples)",
                target, count, self.config.min_samples
            ),
        );

        if elapsed >= duration && count >= self.config.min_samples {
            return Ok(self.finish_point());
        }

        if elapsed >= duration * 2.0 && count >= FORCE_COMPLETE_MIN_SAMPLES {
            log::warn!(
                "[CalibrationEngine] Timeout, force completion: {} samples",
                count
            );
            return Ok(self.finish_point());
        }

        if count < FORCE_COMPLETE_MIN_SAMPLES {
            if let Some(factor) = self.config.stall_timeout_factor {
                if elapsed >= duration * factor {
                    return Err(self.abort_collection(elapsed, count));
                }
            }
        }

        if elapsed >= duration * 2.0 {
            if let Some(session) = self.session.as_mut() {
                if !session.stall_warned {
                    session.stall_warned = true;
                    log::warn!(
                        "[CalibrationEngine] Insufficient collected data after {:.1}s: {} samples, still waiting",
                        elapsed,
                        count
                    );
                }
            }
        }

        Ok(None)
    }

    /// Finalize the running point and return to `Idle`
    ///
    /// # Returns
    /// * `true` - Point appended
    /// * `false` - No collection, or no steady-state readings yet
    pub fn complete_current_point(&mut self) -> bool {
        self.finish_point().is_some()
    }

    fn finish_point(&mut self) -> Option<CalibrationPoint> {
        let has_readings = self
            .session
            .as_ref()
            .map(|s| s.sample_count() > 0)
            .unwrap_or(false);
        if !has_readings {
            log::error!("[CalibrationEngine] No data to collect");
            return None;
        }

        let mut point = self.session.take()?.point;
        point.quality_score = self.evaluate_point_quality(&point);
        self.points.push(point.clone());
        if self.current_step < self.planned_weights.len() {
            self.current_step += 1;
        }
        self.set_state(CalibrationState::Idle);
        self.emit(CalibrationEvent::PointCollected(point.clone()));

        log::info!(
            "[CalibrationEngine] Point collection completed: {}g, Quality: {:.3}",
            point.reference_weight,
            point.quality_score
        );
        Some(point)
    }

    fn abort_collection(&mut self, elapsed: f64, count: usize) -> CalibrationError {
        let err = CalibrationError::CollectionTimeout {
            elapsed_secs: elapsed,
            samples: count,
        };
        log_calibration_error(&err, "tick");
        self.session = None;
        self.emit(CalibrationEvent::Error {
            code: err.code(),
            message: err.message(),
        });
        self.set_state(CalibrationState::Error);
        err
    }

    /// Point quality from dispersion and sample count, clamped to [0, 1]
    fn evaluate_point_quality(&self, point: &CalibrationPoint) -> f64 {
        let mut quality: f64 = 1.0;
        if point.cv_percentage() > self.config.max_cv_percentage {
            quality *= 0.5;
        }
        if point.sensor_readings.len() < self.config.min_samples {
            quality *= 0.7;
        }
        quality.clamp(0.0, 1.0)
    }

    /// Fit the collected points with `method`
    ///
    /// A result that fails validation is still returned with
    /// `validation_passed = false`.
    ///
    /// # Errors
    /// * `InsufficientData` - Fewer points than the method needs (state unchanged)
    /// * `InvalidState` - A point collection is running
    /// * `DegenerateFit` - Regression failed; the engine moves to `Error`
    pub fn calculate_calibration(
        &mut self,
        method: CalibrationMethod,
    ) -> Result<CalibrationResult, CalibrationError> {
        self.check_ready_to_fit(method.degree() + 1)?;
        self.set_state(CalibrationState::Processing);

        match self.fit_result(method) {
            Ok(result) => Ok(self.finalize(result)),
            Err(err) => Err(self.fail(err, "calculate_calibration")),
        }
    }

    /// Fit every method and keep the best validated one
    ///
    /// Validated fits are ranked by `r_squared - 0.1 * rmse`. If none
    /// validates, the linear fit is returned.
    pub fn select_best_method(&mut self) -> Result<CalibrationResult, CalibrationError> {
        self.check_ready_to_fit(MIN_CALIBRATION_POINTS)?;
        self.set_state(CalibrationState::Processing);

        let mut best: Option<(f64, CalibrationResult)> = None;
        for method in CalibrationMethod::ALL {
            match self.fit_result(method) {
                Ok(result) if result.validation_passed => {
                    let score = result.r_squared - result.rmse * RMSE_PENALTY;
                    if best.as_ref().map_or(true, |(s, _)| score > *s) {
                        best = Some((score, result));
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    log::debug!("[CalibrationEngine] Skipping {}: {}", method, err);
                }
            }
        }

        match best {
            Some((_, result)) => {
                log::info!(
                    "[CalibrationEngine] Optimal method selected: {}",
                    result.method
                );
                Ok(self.finalize(result))
            }
            None => match self.fit_result(CalibrationMethod::Linear) {
                Ok(result) => Ok(self.finalize(result)),
                Err(err) => Err(self.fail(err, "select_best_method")),
            },
        }
    }

    fn check_ready_to_fit(&self, required: usize) -> Result<(), CalibrationError> {
        if self.state == CalibrationState::Collecting {
            let err = CalibrationError::InvalidState {
                reason: "cannot fit while a point is being collected".to_string(),
            };
            log::warn!("[CalibrationEngine] {}", err);
            return Err(err);
        }
        let required = required.max(MIN_CALIBRATION_POINTS);
        if self.points.len() < required {
            let err = CalibrationError::InsufficientData {
                required,
                collected: self.points.len(),
            };
            log_calibration_error(&err, "calculate_calibration");
            return Err(err);
        }
        Ok(())
    }

    fn fit_result(&self, method: CalibrationMethod) -> Result<CalibrationResult, CalibrationError> {
        let x: Vec<f64> = self.points.iter().map(|p| p.average_reading()).collect();
        let y: Vec<f64> = self.points.iter().map(|p| p.reference_weight).collect();
        let outcome = regression::fit(method, &x, &y)?;

        let mut result = CalibrationResult {
            method,
            coefficients: outcome.coefficients,
            r_squared: outcome.r_squared,
            rmse: outcome.rmse,
            created_time: now_unix_seconds(),
            validation_passed: false,
            points: self.points.clone(),
        };
        result.validation_passed = ResultValidator::issues(&result).is_empty();
        Ok(result)
    }

    fn finalize(&mut self, result: CalibrationResult) -> CalibrationResult {
        ResultValidator::validate(&result);
        self.set_state(CalibrationState::Completed);
        self.last_result = Some(result.clone());
        self.emit(CalibrationEvent::Completed(result.clone()));

        log::info!(
            "[CalibrationEngine] Calibration completed - Method: {}, R²: {:.6}, RMSE: {:.6}",
            result.method,
            result.r_squared,
            result.rmse
        );
        result
    }

    fn fail(&mut self, err: CalibrationError, context: &str) -> CalibrationError {
        log_calibration_error(&err, context);
        self.emit(CalibrationEvent::Error {
            code: err.code(),
            message: format!("Calculation error: {}", err.message()),
        });
        self.set_state(CalibrationState::Error);
        err
    }

    /// Discard all points and the running collection; back to `Idle`
    pub fn cancel_calibration(&mut self) {
        self.reset();
        log::info!("[CalibrationEngine] Calibration cancelled");
    }

    /// Release collection state before shutdown
    pub fn cleanup(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.session = None;
        self.points.clear();
        self.planned_weights.clear();
        self.current_step = 0;
        self.set_state(CalibrationState::Idle);
    }

    // ========================================================================
    // STEP TRACKING
    // ========================================================================

    pub fn planned_weights(&self) -> &[f64] {
        &self.planned_weights
    }

    /// Reference weight of the next planned step
    pub fn next_reference_weight(&self) -> Option<f64> {
        self.planned_weights.get(self.current_step).copied()
    }

    /// Steps completed or skipped
    pub fn steps_completed(&self) -> usize {
        self.current_step
    }

    pub fn total_steps(&self) -> usize {
        self.planned_weights.len()
    }

    /// Skip the current planned step, abandoning a running collection
    ///
    /// # Returns
    /// * `true` - Advanced to the next step
    /// * `false` - No planned step remains
    pub fn skip_current_step(&mut self) -> bool {
        if self.current_step >= self.planned_weights.len() {
            return false;
        }
        if self.session.take().is_some() {
            self.set_state(CalibrationState::Idle);
        }
        log::info!(
            "[CalibrationEngine] Step {} skipped ({}g)",
            self.current_step + 1,
            self.planned_weights[self.current_step]
        );
        self.current_step += 1;
        true
    }

    /// Current calibration progress
    pub fn get_progress(&self) -> CalibrationProgress {
        let now = self.time_source.now();
        let (phase, percent, status, target_weight, samples_collected) = match &self.session {
            Some(session) => {
                let elapsed = session.phase_elapsed(now);
                let (percent, status) = match session.phase {
                    SessionPhase::Stabilizing { .. } => (
                        phase_percent(elapsed, self.config.stabilization_time),
                        format!("Stabilizing... {}g", session.target_weight),
                    ),
                    SessionPhase::SteadyState { .. } => (
                        phase_percent(elapsed, self.config.collection_duration),
                        format!(
                            "Collecting... {}g ({}/{} samples)",
                            session.target_weight,
                            session.sample_count(),
                            self.config.min_samples
                        ),
                    ),
                };
                (
                    Some(session.phase_kind()),
                    percent,
                    status,
                    Some(session.target_weight),
                    session.sample_count(),
                )
            }
            None => (None, 0, self.state.to_string(), None, 0),
        };

        CalibrationProgress {
            state: self.state,
            phase,
            percent,
            status,
            target_weight,
            samples_collected,
            samples_needed: self.config.min_samples,
            steps_completed: self.current_step,
            total_steps: self.planned_weights.len(),
            points_collected: self.points.len(),
        }
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    fn set_state(&mut self, new_state: CalibrationState) {
        if self.state != new_state {
            log::debug!(
                "[CalibrationEngine] State change: {} -> {}",
                self.state,
                new_state
            );
            self.state = new_state;
            self.emit(CalibrationEvent::StateChanged(new_state));
        }
    }

    fn emit_progress(&self, percent: u8, status: String) {
        self.emit(CalibrationEvent::Progress { percent, status });
    }

    fn emit(&self, event: CalibrationEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new_default()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
