//! MonitorHandle: orchestration layer for the sensor monitor.
//!
//! Owns the data processor, the calibration engine (through
//! `CalibrationManager`) and the broadcast channels, and runs the worker that
//! drains the sample ring and fires the periodic statistics and calibration
//! ticks.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::calibration::{
    CalibrationEngine, CalibrationInfo, CalibrationMethod, CalibrationPoint, CalibrationProgress,
    CalibrationResult, CalibrationState,
};
use crate::clock::{SystemTimeSource, TimeSource};
use crate::config::AppConfig;
use crate::engine::backend::{LinkMetrics, SampleSource};
use crate::error::{CalibrationError, ConfigError, ProcessingError, SourceError};
use crate::managers::{BroadcastChannelManager, CalibrationManager};
use crate::processing::{BoundedHistory, DataProcessor, ProcessedSample, RawSample, StatisticsSnapshot};

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

/// Capacity of the source-to-worker sample ring
pub const SAMPLE_RING_CAPACITY: usize = 8192;

/// How often the worker drains the sample ring
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(5);

/// Shared pipeline state touched by both the worker and the control surface.
#[derive(Clone)]
struct Pipeline {
    processor: Arc<Mutex<DataProcessor>>,
    calibration: Arc<Mutex<CalibrationEngine>>,
}

impl Pipeline {
    fn processor(&self) -> MutexGuard<'_, DataProcessor> {
        self.processor.lock().unwrap_or_else(|poisoned| {
            log::warn!("[MonitorHandle] Recovering poisoned processor lock");
            poisoned.into_inner()
        })
    }

    /// Process one sample and, while a point is collecting, feed the raw
    /// reading to the engine so point statistics see the unsmoothed signal
    fn ingest(&self, raw: RawSample) -> Result<ProcessedSample, ProcessingError> {
        let sample = self.processor().process_sample(raw)?;

        match self.calibration.lock() {
            Ok(mut engine) if engine.is_collecting() => {
                engine.add_sensor_reading(sample.raw_value);
            }
            Ok(_) => {}
            Err(_) => log::error!("[MonitorHandle] Calibration engine lock poisoned"),
        }
        Ok(sample)
    }

    /// Process everything currently queued; parse errors are already reported
    fn drain(&self, consumer: &mut rtrb::Consumer<RawSample>) -> usize {
        let mut processed = 0;
        while let Ok(raw) = consumer.pop() {
            if self.ingest(raw).is_ok() {
                processed += 1;
            }
        }
        processed
    }

    fn statistics_tick(&self) -> StatisticsSnapshot {
        self.processor().update_statistics()
    }

    fn calibration_tick(&self) -> Result<Option<CalibrationPoint>, CalibrationError> {
        let outcome = self
            .calibration
            .lock()
            .map_err(|_| CalibrationError::StatePoisoned)?
            .tick();
        if outcome.is_err() {
            self.processor().set_calibration_mode(false);
        }
        outcome
    }
}

/// Running worker thread plus its shutdown signal.
struct Worker {
    shutdown_tx: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

/// MonitorHandle orchestrates the processing pipeline and shared channels.
pub struct MonitorHandle {
    config: Arc<RwLock<AppConfig>>,
    pipeline: Pipeline,
    calibration: CalibrationManager,
    pub(crate) broadcasts: BroadcastChannelManager,
    source: Mutex<Option<Arc<dyn SampleSource>>>,
    worker: Mutex<Option<Worker>>,
    running: AtomicBool,
    time_source: Arc<dyn TimeSource>,
    start_instant: Instant,
}

impl MonitorHandle {
    /// Create a handle reading time from the system clock.
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        Self::with_time_source(config, Arc::new(SystemTimeSource::default()))
    }

    /// Create a handle with an explicit time source (tests, replays).
    pub fn with_time_source(
        config: AppConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let broadcasts = BroadcastChannelManager::new();
        let mut processor = DataProcessor::new(config.processing.clone())?;
        processor.set_event_sender(broadcasts.init_processor());

        let calibration =
            CalibrationManager::new(config.collection.clone(), Arc::clone(&time_source));
        if let Err(err) = calibration.set_event_sender(broadcasts.init_calibration()) {
            log::error!("[MonitorHandle] Failed to wire calibration events: {}", err);
        }

        let pipeline = Pipeline {
            processor: Arc::new(Mutex::new(processor)),
            calibration: calibration.get_engine_arc(),
        };

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            pipeline,
            calibration,
            broadcasts,
            source: Mutex::new(None),
            worker: Mutex::new(None),
            running: AtomicBool::new(false),
            start_instant: time_source.now(),
            time_source,
        })
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Start `source` and the worker that processes its samples.
    pub fn start(&self, source: Arc<dyn SampleSource>) -> Result<(), SourceError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SourceError::AlreadyRunning);
        }

        let (producer, consumer) = rtrb::RingBuffer::new(SAMPLE_RING_CAPACITY);
        if let Err(err) = source.start(producer) {
            self.running.store(false, Ordering::SeqCst);
            return Err(err);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let config = self.config_snapshot();
        let stats_interval = Duration::from_millis(config.processing.statistics_interval_ms);
        let tick_interval = Duration::from_millis(config.collection.tick_interval_ms);
        let pipeline = self.pipeline.clone();
        let source_name = source.name().to_string();

        // The worker gets its own current-thread runtime so callers need not
        // be inside one.
        let thread = std::thread::spawn(move || {
            let span = tracing::info_span!("monitor_worker", source = %source_name);
            let _enter = span.enter();

            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(err) => {
                    log::error!("[MonitorHandle] Failed to create worker runtime: {}", err);
                    return;
                }
            };
            rt.block_on(Self::run_worker(
                pipeline,
                consumer,
                shutdown_rx,
                stats_interval,
                tick_interval,
            ));
        });

        *self.lock_source() = Some(source);
        *self.lock_worker() = Some(Worker {
            shutdown_tx,
            thread,
        });
        log::info!("[MonitorHandle] Monitoring started");
        Ok(())
    }

    async fn run_worker(
        pipeline: Pipeline,
        mut consumer: rtrb::Consumer<RawSample>,
        mut shutdown_rx: oneshot::Receiver<()>,
        stats_interval: Duration,
        tick_interval: Duration,
    ) {
        let mut drain = tokio::time::interval(DRAIN_INTERVAL);
        let mut statistics = tokio::time::interval(stats_interval);
        let mut calibration = tokio::time::interval(tick_interval);
        for timer in [&mut drain, &mut statistics, &mut calibration] {
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        }

        loop {
            tokio::select! {
                _ = drain.tick() => {
                    pipeline.drain(&mut consumer);
                }
                _ = statistics.tick() => {
                    pipeline.statistics_tick();
                }
                _ = calibration.tick() => {
                    if let Ok(Some(point)) = pipeline.calibration_tick() {
                        tracing::debug!(weight = point.reference_weight, "point collected");
                    }
                }
                _ = &mut shutdown_rx => {
                    let remaining = pipeline.drain(&mut consumer);
                    log::debug!("[MonitorHandle] Worker drained {} samples on shutdown", remaining);
                    break;
                }
            }
        }
    }

    /// Stop the source and join the worker.
    pub fn stop(&self) -> Result<(), SourceError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(SourceError::NotRunning);
        }

        if let Some(source) = self.lock_source().take() {
            // A finite source may already have stopped on its own.
            if let Err(err) = source.stop() {
                log::debug!("[MonitorHandle] Source stop: {}", err);
            }
        }
        if let Some(worker) = self.lock_worker().take() {
            let _ = worker.shutdown_tx.send(());
            if worker.thread.join().is_err() {
                log::error!("[MonitorHandle] Worker thread panicked");
            }
        }
        log::info!("[MonitorHandle] Monitoring stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True while the attached source still produces samples
    pub fn is_source_active(&self) -> bool {
        self.lock_source()
            .as_ref()
            .map(|source| source.is_running())
            .unwrap_or(false)
    }

    pub fn source_metrics(&self) -> Option<LinkMetrics> {
        self.lock_source().as_ref().map(|source| source.metrics())
    }

    /// Release pipeline and calibration state; stops monitoring first
    pub fn cleanup(&self) {
        if self.is_running() {
            let _ = self.stop();
        }
        if let Err(err) = self.calibration.cancel() {
            log::error!("[MonitorHandle] Calibration cleanup failed: {}", err);
        }
        self.pipeline.processor().cleanup();
    }

    // ========================================================================
    // SYNCHRONOUS DRIVE
    // ========================================================================

    /// Process one line synchronously, bypassing the sample ring.
    pub fn ingest_line(&self, line: &str) -> Result<ProcessedSample, ProcessingError> {
        self.pipeline
            .ingest(RawSample::text(line, crate::clock::now_unix_seconds()))
    }

    pub fn ingest_sample(&self, raw: RawSample) -> Result<ProcessedSample, ProcessingError> {
        self.pipeline.ingest(raw)
    }

    /// Run one calibration progress check outside the worker
    pub fn calibration_tick(&self) -> Result<Option<CalibrationPoint>, CalibrationError> {
        self.pipeline.calibration_tick()
    }

    pub fn update_statistics(&self) -> StatisticsSnapshot {
        self.pipeline.statistics_tick()
    }

    pub fn get_statistics(&self) -> StatisticsSnapshot {
        self.pipeline.processor().get_statistics()
    }

    pub fn history(&self) -> Arc<BoundedHistory> {
        self.pipeline.processor().history()
    }

    pub fn get_all_data(&self) -> Vec<ProcessedSample> {
        self.pipeline.processor().get_all_data()
    }

    pub fn clear_buffer(&self) {
        self.pipeline.processor().clear_buffer();
    }

    // ========================================================================
    // CONFIGURATION
    // ========================================================================

    /// Apply a new configuration to the processor and calibration engine.
    ///
    /// Running worker intervals keep their old values until the next `start`.
    pub fn update_config(&self, config: AppConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.calibration
            .update_config(config.collection.clone())
            .map_err(|err| ConfigError::InvalidParameter {
                field: "collection",
                reason: err.to_string(),
            })?;
        self.pipeline
            .processor()
            .update_config(config.processing.clone())?;

        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        *guard = config;
        Ok(())
    }

    pub fn update_butterworth_filter(
        &self,
        cutoff_hz: Option<f64>,
        sampling_rate: Option<f64>,
        order: Option<usize>,
    ) -> Result<bool, ConfigError> {
        let changed = self
            .pipeline
            .processor()
            .update_butterworth_filter(cutoff_hz, sampling_rate, order)?;
        if changed {
            let processing = self.pipeline.processor().config().clone();
            let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
            guard.processing = processing;
        }
        Ok(changed)
    }

    /// Snapshot the current app configuration.
    pub fn config_snapshot(&self) -> AppConfig {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .unwrap_or_else(|err| err.into_inner().clone())
    }

    // ========================================================================
    // CALIBRATION METHODS
    // ========================================================================

    /// Begin a calibration run; the processor enters calibration mode.
    pub fn start_calibration(&self, reference_weights: &[f64]) -> Result<(), CalibrationError> {
        self.calibration.start(reference_weights)?;
        self.pipeline.processor().set_calibration_mode(true);
        Ok(())
    }

    pub fn start_point_collection(&self, reference_weight: f64) -> Result<(), CalibrationError> {
        self.calibration.start_point_collection(reference_weight)
    }

    pub fn complete_current_point(&self) -> Result<(), CalibrationError> {
        self.calibration.complete_point()
    }

    pub fn skip_calibration_step(&self) -> Result<bool, CalibrationError> {
        self.calibration.skip_step()
    }

    pub fn calculate_calibration(
        &self,
        method: CalibrationMethod,
    ) -> Result<CalibrationResult, CalibrationError> {
        self.calibration.calculate(method)
    }

    pub fn select_best_calibration(&self) -> Result<CalibrationResult, CalibrationError> {
        self.calibration.select_best()
    }

    /// Drop the calibration run and leave calibration mode.
    pub fn cancel_calibration(&self) -> Result<(), CalibrationError> {
        self.calibration.cancel()?;
        self.pipeline.processor().set_calibration_mode(false);
        Ok(())
    }

    /// Install (or clear) the curve used for calibrated output.
    pub fn apply_calibration(&self, result: Option<CalibrationResult>) {
        let mut processor = self.pipeline.processor();
        processor.set_calibration(result);
        processor.set_calibration_mode(false);
    }

    pub fn calibration_state(&self) -> Result<CalibrationState, CalibrationError> {
        self.calibration.state()
    }

    pub fn calibration_progress(&self) -> Result<CalibrationProgress, CalibrationError> {
        self.calibration.progress()
    }

    pub fn next_reference_weight(&self) -> Result<Option<f64>, CalibrationError> {
        self.calibration.next_reference_weight()
    }

    pub fn is_calibrated(&self) -> bool {
        self.pipeline.processor().is_calibrated()
    }

    pub fn get_calibration_info(&self) -> Option<CalibrationInfo> {
        self.pipeline.processor().get_calibration_info()
    }

    /// Save the last calculated calibration.
    pub fn save_calibration<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        self.calibration.save_result(path)
    }

    /// Load a calibration file and apply it to the processor.
    pub fn load_calibration<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<CalibrationResult, CalibrationError> {
        let result = self.calibration.load_result(path)?;
        self.apply_calibration(Some(result.clone()));
        Ok(result)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Milliseconds elapsed since the handle was created.
    pub fn uptime_ms(&self) -> u64 {
        self.time_source
            .now()
            .saturating_duration_since(self.start_instant)
            .as_millis() as u64
    }

    fn lock_source(&self) -> MutexGuard<'_, Option<Arc<dyn SampleSource>>> {
        self.source.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests;
