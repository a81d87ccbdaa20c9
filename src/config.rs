//! Configuration management for the monitor core
//!
//! This module provides JSON configuration loading for the processing
//! pipeline, the calibration collection protocol and the serial link
//! collaborator. Every struct is validated when it is built or loaded, so
//! invalid parameters fail fast instead of surfacing mid-stream.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub serial: SerialConfig,
}

/// Filter applied to each accepted raw value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    None,
    MovingAverage,
    Median,
    Butterworth,
}

/// Low-pass realisation used by the Butterworth filter slot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LowPassDesign {
    /// Cascaded second-order sections from the bilinear transform
    Iir,
    /// Single-pole RC smoother at the same cutoff
    FirstOrderRc,
}

/// Data processing pipeline parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Capacity of the processed-sample history
    pub max_buffer_size: usize,
    pub filter_type: FilterType,
    /// Window for moving average and median filters (>= 2)
    pub filter_window: usize,
    /// z-score above which a sample is flagged as an outlier
    pub outlier_threshold: f64,
    /// Number of most recent samples used for statistics
    pub statistics_window: usize,
    /// Samples scoring below this bypass the filter
    pub quality_threshold: f64,
    /// Butterworth cutoff frequency (Hz)
    pub butterworth_cutoff: f64,
    pub butterworth_order: usize,
    /// Sample rate of the raw stream (Hz)
    pub sampling_rate: f64,
    pub lowpass_design: LowPassDesign,
    /// Statistics recompute period
    pub statistics_interval_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 50_000,
            filter_type: FilterType::MovingAverage,
            filter_window: 5,
            outlier_threshold: 3.0,
            statistics_window: 1000,
            quality_threshold: 0.5,
            butterworth_cutoff: 1.0,
            butterworth_order: 2,
            sampling_rate: 10.0,
            lowpass_design: LowPassDesign::Iir,
            statistics_interval_ms: 1000,
        }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_buffer_size == 0 {
            return Err(ConfigError::invalid("max_buffer_size", "must be at least 1"));
        }
        if self.filter_window < 2 {
            return Err(ConfigError::invalid(
                "filter_window",
                format!("must be at least 2 (got {})", self.filter_window),
            ));
        }
        if !(self.outlier_threshold > 0.0) {
            return Err(ConfigError::invalid("outlier_threshold", "must be positive"));
        }
        if self.statistics_window == 0 {
            return Err(ConfigError::invalid("statistics_window", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::invalid(
                "quality_threshold",
                "must lie within [0, 1]",
            ));
        }
        if !(self.butterworth_cutoff > 0.0) {
            return Err(ConfigError::invalid("butterworth_cutoff", "must be positive"));
        }
        if !(self.sampling_rate > 0.0) {
            return Err(ConfigError::invalid("sampling_rate", "must be positive"));
        }
        if !(1..=8).contains(&self.butterworth_order) {
            return Err(ConfigError::invalid(
                "butterworth_order",
                format!("must be between 1 and 8 (got {})", self.butterworth_order),
            ));
        }
        if self.statistics_interval_ms == 0 {
            return Err(ConfigError::invalid("statistics_interval_ms", "must be positive"));
        }
        Ok(())
    }
}

/// Calibration point collection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionConfig {
    /// Steady-state collection duration (seconds)
    pub collection_duration: f64,
    /// Readings required before a point completes
    pub min_samples: usize,
    /// CV% above which point quality is halved
    pub max_cv_percentage: f64,
    /// Base z-score for the relaxed calibration outlier gate (applied x3)
    pub outlier_threshold: f64,
    /// Settling window discarded before counting readings (seconds)
    pub stabilization_time: f64,
    /// Calibration tick period
    pub tick_interval_ms: u64,
    /// Abort a starving collection at this multiple of `collection_duration`
    pub stall_timeout_factor: Option<f64>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            collection_duration: 10.0,
            min_samples: 150,
            max_cv_percentage: 5.0,
            outlier_threshold: 3.0,
            stabilization_time: 3.0,
            tick_interval_ms: 100,
            stall_timeout_factor: None,
        }
    }
}

impl CollectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.collection_duration > 0.0) {
            return Err(ConfigError::invalid("collection_duration", "must be positive"));
        }
        if self.min_samples == 0 {
            return Err(ConfigError::invalid("min_samples", "must be at least 1"));
        }
        if !(self.max_cv_percentage > 0.0) {
            return Err(ConfigError::invalid("max_cv_percentage", "must be positive"));
        }
        if !(self.outlier_threshold > 0.0) {
            return Err(ConfigError::invalid("outlier_threshold", "must be positive"));
        }
        if !(self.stabilization_time >= 0.0) {
            return Err(ConfigError::invalid(
                "stabilization_time",
                "cannot be negative",
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("tick_interval_ms", "must be positive"));
        }
        if let Some(factor) = self.stall_timeout_factor {
            if !(factor >= 1.0) {
                return Err(ConfigError::invalid(
                    "stall_timeout_factor",
                    format!("must be at least 1.0 (got {})", factor),
                ));
            }
        }
        Ok(())
    }
}

/// Serial link parameters handed to the acquisition collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
    /// Read timeout (seconds)
    pub timeout: f64,
    pub rtscts: bool,
    pub parity: char,
    pub stopbits: u8,
    pub bytesize: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baudrate: 921_600,
            timeout: 1.0,
            rtscts: true,
            parity: 'N',
            stopbits: 1,
            bytesize: 8,
        }
    }
}

impl SerialConfig {
    /// Build a validated serial configuration
    ///
    /// # Errors
    /// * `InvalidBaudrate` - baudrate is zero
    /// * `InvalidTimeout` - timeout is negative or not a number
    pub fn new(port: impl Into<String>, baudrate: u32, timeout: f64) -> Result<Self, ConfigError> {
        let config = Self {
            port: port.into(),
            baudrate,
            timeout,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baudrate == 0 {
            return Err(ConfigError::InvalidBaudrate {
                baudrate: i64::from(self.baudrate),
            });
        }
        if !(self.timeout >= 0.0) {
            return Err(ConfigError::InvalidTimeout {
                timeout: self.timeout,
            });
        }
        Ok(())
    }
}

impl AppConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.processing.validate()?;
        self.collection.validate()?;
        self.serial.validate()
    }

    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` - Loaded and validated configuration
    /// * `Err(ConfigError)` - File unreadable, JSON invalid, or values rejected
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let config: AppConfig = serde_json::from_str(&contents).map_err(|err| {
            log::warn!("[Config] Failed to parse JSON from {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.display().to_string(),
                reason: err.to_string(),
            }
        })?;
        config.validate()?;
        log::info!("[Config] Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    ///
    /// A present but invalid file is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!(
                "[Config] No config file at {:?}. Using defaults.",
                path
            );
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// Write configuration as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        fs::write(path, json).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        log::info!("[Config] Saved configuration to {:?}", path);
        Ok(())
    }
}
