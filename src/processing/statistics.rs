//! Descriptive statistics over the most recent window of effective values.

use serde::{Deserialize, Serialize};

/// Minimum sample count before a trend is estimated
pub const MIN_TREND_SAMPLES: usize = 10;

/// Relative change between window halves that counts as a trend
pub const TREND_THRESHOLD: f64 = 0.05;

/// Direction of the signal across the statistics window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

/// Snapshot recomputed periodically from the history buffer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatisticsSnapshot {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
    pub trend: Trend,
}

impl StatisticsSnapshot {
    /// Compute every field; an empty window yields all zeros
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        Self {
            count: values.len(),
            mean: mean(values),
            std: std_dev(values),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            median: percentile_sorted(&sorted, 50.0),
            p25: percentile_sorted(&sorted, 25.0),
            p75: percentile_sorted(&sorted, 75.0),
            trend: trend(values),
        }
    }
}

/// Arithmetic mean (0.0 for an empty slice)
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (0.0 for an empty slice)
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Median; sorts `values` in place
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    percentile_sorted(values, 50.0)
}

/// Percentile of an ascending slice using linear interpolation between ranks
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

/// Compare the means of the first and second halves of the window
pub fn trend(values: &[f64]) -> Trend {
    if values.len() < MIN_TREND_SAMPLES {
        return Trend::Stable;
    }
    let half = values.len() / 2;
    let first = mean(&values[..half]);
    let second = mean(&values[half..]);
    let ratio = if first != 0.0 {
        (second - first) / first
    } else {
        0.0
    };

    if ratio > TREND_THRESHOLD {
        Trend::Increasing
    } else if ratio < -TREND_THRESHOLD {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}
