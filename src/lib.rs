// Scale Monitor Core - load-cell signal processing and calibration
// Filtering, streaming statistics, quality scoring and multi-point calibration

// Module declarations
pub mod calibration;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod managers;
pub mod processing;

// Re-exports for convenience
pub use calibration::{CalibrationEngine, CalibrationMethod, CalibrationResult};
pub use config::AppConfig;
pub use engine::MonitorHandle;
pub use processing::{DataProcessor, ProcessedSample};
