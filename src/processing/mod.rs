// Data processing pipeline
//
// Invoked once per incoming raw line:
// parse -> quality score -> filter -> apply calibration -> outlier check
// -> append to history -> publish.
//
// The pipeline keeps no state machine of its own. Sample-level failures are
// reported and dropped; the next sample is processed normally.

pub mod buffer;
pub mod filters;
pub mod quality;
pub mod statistics;

pub use buffer::BoundedHistory;
pub use filters::{
    ButterworthFilter, MedianFilter, MovingAverageFilter, RcLowPass, SampleFilter, SignalFilter,
};
pub use statistics::{StatisticsSnapshot, Trend};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::calibration::{CalibrationInfo, CalibrationResult};
use crate::clock::now_unix_seconds;
use crate::config::{FilterType, ProcessingConfig};
use crate::error::{log_processing_error, ConfigError, ErrorCode, ProcessingError};
use crate::events::ProcessorEvent;

/// Payload delivered by the sample source
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Text(String),
    Value(f64),
}

/// A single reading plus its arrival time (unix seconds)
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub payload: RawPayload,
    pub arrival_time: f64,
}

impl RawSample {
    pub fn text(line: impl Into<String>, arrival_time: f64) -> Self {
        Self {
            payload: RawPayload::Text(line.into()),
            arrival_time,
        }
    }

    pub fn value(value: f64, arrival_time: f64) -> Self {
        Self {
            payload: RawPayload::Value(value),
            arrival_time,
        }
    }
}

/// Output of the pipeline for one raw sample
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedSample {
    pub timestamp: f64,
    pub raw_value: f64,
    pub filtered_value: Option<f64>,
    pub calibrated_value: Option<f64>,
    pub quality_score: f64,
}

impl ProcessedSample {
    /// Effective value: calibrated, else filtered, else raw
    pub fn value(&self) -> f64 {
        self.calibrated_value
            .or(self.filtered_value)
            .unwrap_or(self.raw_value)
    }
}

/// Parse one line of the serial feed into a finite float
pub fn parse_raw_value(line: &str) -> Result<f64, ProcessingError> {
    let trimmed = line.trim();
    let value: f64 = trimmed.parse().map_err(|err: std::num::ParseFloatError| {
        ProcessingError::Parse {
            input: trimmed.to_string(),
            reason: err.to_string(),
        }
    })?;
    if !value.is_finite() {
        return Err(ProcessingError::Parse {
            input: trimmed.to_string(),
            reason: "value is not finite".to_string(),
        });
    }
    Ok(value)
}

/// DataProcessor owns the history buffer, the filter slot and the active
/// calibration curve
pub struct DataProcessor {
    config: ProcessingConfig,
    history: Arc<BoundedHistory>,
    filter: Option<SignalFilter>,
    calibration: Option<Arc<CalibrationResult>>,
    calibration_mode: bool,
    statistics: StatisticsSnapshot,
    events: Option<broadcast::Sender<ProcessorEvent>>,
}

impl DataProcessor {
    /// Create a pipeline from a validated configuration
    pub fn new(config: ProcessingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        log::info!(
            "[DataProcessor] Initialized: filter={:?}, buffer={}, stats_window={}",
            config.filter_type,
            config.max_buffer_size,
            config.statistics_window
        );
        Ok(Self {
            history: Arc::new(BoundedHistory::new(config.max_buffer_size)),
            filter: SignalFilter::from_config(&config),
            calibration: None,
            calibration_mode: false,
            statistics: StatisticsSnapshot::default(),
            events: None,
            config,
        })
    }

    /// Publish events on `tx`
    pub fn set_event_sender(&mut self, tx: broadcast::Sender<ProcessorEvent>) {
        self.events = Some(tx);
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Shared handle for concurrent readers
    pub fn history(&self) -> Arc<BoundedHistory> {
        Arc::clone(&self.history)
    }

    /// Parse and process one line stamped with the current wall time
    pub fn process_raw_data(&mut self, line: &str) -> Result<ProcessedSample, ProcessingError> {
        self.process_sample(RawSample::text(line, now_unix_seconds()))
    }

    /// Process one sample delivered by a source
    pub fn process_sample(&mut self, raw: RawSample) -> Result<ProcessedSample, ProcessingError> {
        let value = match raw.payload {
            RawPayload::Value(value) if value.is_finite() => Ok(value),
            RawPayload::Value(value) => Err(ProcessingError::Parse {
                input: value.to_string(),
                reason: "value is not finite".to_string(),
            }),
            RawPayload::Text(ref line) => parse_raw_value(line),
        };

        match value {
            Ok(value) => Ok(self.process_value(value, raw.arrival_time)),
            Err(err) => {
                log_processing_error(&err, "process_raw_data");
                self.emit(ProcessorEvent::ProcessingError {
                    code: err.code(),
                    message: err.message(),
                });
                Err(err)
            }
        }
    }

    fn process_value(&mut self, raw_value: f64, timestamp: f64) -> ProcessedSample {
        let recent_raw = self.history.latest_raw_values(quality::QUALITY_CONTEXT_LEN);
        let quality_score = quality::quality_score(raw_value, &recent_raw);

        let filtered_value = match self.filter.as_mut() {
            Some(filter) if quality_score >= self.config.quality_threshold => {
                filter.filter(raw_value)
            }
            _ => raw_value,
        };

        let calibrated_value = match &self.calibration {
            Some(curve) => curve.apply(filtered_value),
            None => filtered_value,
        };

        let sample = ProcessedSample {
            timestamp,
            raw_value,
            filtered_value: Some(filtered_value),
            calibrated_value: Some(calibrated_value),
            quality_score,
        };

        if !self.calibration_mode {
            let recent = self.history.latest_values(quality::OUTLIER_CONTEXT_LEN);
            if quality::is_outlier(sample.value(), &recent, self.config.outlier_threshold) {
                log::debug!(
                    "[DataProcessor] Outlier flagged: value={:.4}",
                    sample.value()
                );
                self.emit(ProcessorEvent::OutlierDetected(sample.clone()));
            }
        }

        self.history.append(sample.clone());
        self.emit(ProcessorEvent::SampleProcessed(sample.clone()));
        sample
    }

    /// Recompute statistics over the most recent window and publish them
    pub fn update_statistics(&mut self) -> StatisticsSnapshot {
        let values = self.history.latest_values(self.config.statistics_window);
        self.statistics = StatisticsSnapshot::from_values(&values);
        self.emit(ProcessorEvent::StatisticsUpdated(self.statistics.clone()));
        self.statistics.clone()
    }

    /// Last computed statistics snapshot
    pub fn get_statistics(&self) -> StatisticsSnapshot {
        self.statistics.clone()
    }

    /// Install or remove the active calibration curve
    pub fn set_calibration(&mut self, calibration: Option<CalibrationResult>) {
        self.calibration = calibration.map(Arc::new);
        let calibrated = self.calibration.is_some();
        match &self.calibration {
            Some(curve) => log::info!(
                "[DataProcessor] Calibration applied: method={}, r2={:.4}",
                curve.method,
                curve.r_squared
            ),
            None => log::info!("[DataProcessor] Calibration removed"),
        }
        self.emit(ProcessorEvent::CalibrationStatusChanged { calibrated });
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn get_calibration_info(&self) -> Option<CalibrationInfo> {
        self.calibration.as_deref().map(CalibrationInfo::from)
    }

    /// Replace the configuration and rebuild the filter
    pub fn update_config(&mut self, config: ProcessingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if config.max_buffer_size != self.config.max_buffer_size {
            self.history.set_capacity(config.max_buffer_size);
        }
        self.filter = SignalFilter::from_config(&config);
        self.config = config;
        log::info!(
            "[DataProcessor] Configuration updated: filter={:?}",
            self.config.filter_type
        );
        Ok(())
    }

    /// Change Butterworth parameters; unspecified values are kept
    ///
    /// # Returns
    /// * `Ok(true)` - The active Butterworth filter was re-initialized
    /// * `Ok(false)` - Butterworth is not the active filter; nothing changed
    pub fn update_butterworth_filter(
        &mut self,
        cutoff: Option<f64>,
        sampling_rate: Option<f64>,
        order: Option<usize>,
    ) -> Result<bool, ConfigError> {
        if self.config.filter_type != FilterType::Butterworth {
            log::warn!(
                "[DataProcessor] Butterworth update ignored: active filter is {:?}",
                self.config.filter_type
            );
            return Ok(false);
        }

        let mut candidate = self.config.clone();
        if let Some(cutoff) = cutoff {
            candidate.butterworth_cutoff = cutoff;
        }
        if let Some(rate) = sampling_rate {
            candidate.sampling_rate = rate;
        }
        if let Some(order) = order {
            candidate.butterworth_order = order;
        }
        candidate.validate()?;
        self.config = candidate;

        match self.filter.as_mut().and_then(SignalFilter::as_butterworth_mut) {
            Some(filter) => {
                filter.update_parameters(
                    self.config.butterworth_cutoff,
                    self.config.sampling_rate,
                    self.config.butterworth_order,
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Disable outlier flagging while calibration points are collected
    pub fn set_calibration_mode(&mut self, enabled: bool) {
        if self.calibration_mode != enabled {
            log::info!("[DataProcessor] Calibration mode: {}", enabled);
        }
        self.calibration_mode = enabled;
    }

    pub fn is_calibration_mode(&self) -> bool {
        self.calibration_mode
    }

    /// Clear history and filter state
    pub fn clear_buffer(&mut self) {
        self.history.clear();
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
        self.statistics = StatisticsSnapshot::default();
    }

    pub fn get_all_data(&self) -> Vec<ProcessedSample> {
        self.history.get_all()
    }

    /// Release buffered data and the active calibration before shutdown
    pub fn cleanup(&mut self) {
        self.clear_buffer();
        self.calibration = None;
        self.calibration_mode = false;
        log::info!("[DataProcessor] Cleaned up");
    }

    fn emit(&self, event: ProcessorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
