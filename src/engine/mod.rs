//! Engine module housing the monitor orchestration layer.
//!
//! This module exposes trait-based sample sources (`backend`) and the
//! `MonitorHandle` orchestration layer (`core`) shared by the CLI and
//! embedding applications.

pub mod backend;
pub mod core;

pub use backend::{
    LineReaderSource, LinkMetrics, LoadHandle, Overflow, SampleSource, SimulatedConfig,
    SimulatedSource,
};
pub use core::MonitorHandle;
