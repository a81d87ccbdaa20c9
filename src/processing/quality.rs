//! Per-sample quality heuristic and z-score outlier gate.
//!
//! Both functions are pure: the caller supplies the short recent context.

use crate::processing::statistics::{mean, std_dev};

/// Lower bound of the plausible raw range
pub const SANITY_MIN: f64 = 0.0;
/// Upper bound of the plausible raw range
pub const SANITY_MAX: f64 = 10_000.0;
/// Recent raw samples compared against for quality scoring
pub const QUALITY_CONTEXT_LEN: usize = 3;
/// Recent effective values compared against for outlier detection
pub const OUTLIER_CONTEXT_LEN: usize = 10;
/// History needed before the outlier gate activates
pub const MIN_OUTLIER_HISTORY: usize = 10;

const OUT_OF_RANGE_PENALTY: f64 = 0.5;
const DEVIATION_PENALTY: f64 = 0.7;
const DEVIATION_SIGMAS: f64 = 3.0;

/// Score a raw value in [0, 1]
///
/// `recent` holds previous raw values, oldest first; only the last
/// [`QUALITY_CONTEXT_LEN`] are used.
pub fn quality_score(value: f64, recent: &[f64]) -> f64 {
    let mut quality = 1.0;

    if !(SANITY_MIN..=SANITY_MAX).contains(&value) {
        quality *= OUT_OF_RANGE_PENALTY;
    }

    if recent.len() >= QUALITY_CONTEXT_LEN {
        let context = &recent[recent.len() - QUALITY_CONTEXT_LEN..];
        let m = mean(context);
        let sd = std_dev(context);
        if (value - m).abs() > DEVIATION_SIGMAS * sd {
            quality *= DEVIATION_PENALTY;
        }
    }

    f64::clamp(quality, 0.0, 1.0)
}

/// Whether `value` lies more than `threshold` standard deviations from the
/// last [`OUTLIER_CONTEXT_LEN`] values of `history`
///
/// Returns false with fewer than [`MIN_OUTLIER_HISTORY`] values or a flat
/// context (zero deviation).
pub fn is_outlier(value: f64, history: &[f64], threshold: f64) -> bool {
    if history.len() < MIN_OUTLIER_HISTORY {
        return false;
    }
    let context = &history[history.len() - OUTLIER_CONTEXT_LEN..];
    let sd = std_dev(context);
    if sd == 0.0 {
        return false;
    }
    ((value - mean(context)) / sd).abs() > threshold
}
