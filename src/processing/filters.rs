// Filter bank - stateful single-sample smoothing filters
//
// Every filter consumes one already-parsed float and yields one float. Filters
// never see malformed input; parsing happens in the pipeline before this
// stage. Selection between implementations happens only when configuration
// changes (see `SignalFilter::from_config`).

use std::collections::VecDeque;
use std::f64::consts::PI;

use crate::config::{FilterType, LowPassDesign, ProcessingConfig};
use crate::processing::statistics::median;

/// Normalized cutoff used when the requested one reaches Nyquist
pub const MAX_NORMALIZED_CUTOFF: f64 = 0.99;

/// Uniform one-in/one-out filter capability
pub trait SampleFilter: Send {
    /// Feed one sample and return the filtered value
    fn filter(&mut self, value: f64) -> f64;

    /// Clear internal state, keeping the configuration
    fn reset(&mut self);
}

/// Arithmetic mean of the last `window` inputs
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    window: usize,
    buffer: VecDeque<f64>,
}

impl MovingAverageFilter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            buffer: VecDeque::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl SampleFilter for MovingAverageFilter {
    fn filter(&mut self, value: f64) -> f64 {
        if self.buffer.len() == self.window {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
        self.buffer.iter().sum::<f64>() / self.buffer.len() as f64
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Median of the last `window` inputs (even windows average the middle pair)
#[derive(Debug, Clone)]
pub struct MedianFilter {
    window: usize,
    buffer: VecDeque<f64>,
    scratch: Vec<f64>,
}

impl MedianFilter {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            buffer: VecDeque::with_capacity(window),
            scratch: Vec::with_capacity(window),
        }
    }
}

impl SampleFilter for MedianFilter {
    fn filter(&mut self, value: f64) -> f64 {
        if self.buffer.len() == self.window {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);

        self.scratch.clear();
        self.scratch.extend(self.buffer.iter().copied());
        median(&mut self.scratch)
    }

    fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Direct form I second-order section
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    /// Low-pass section at digital frequency `w0` (rad/sample)
    fn lowpass(w0: f64, q: f64) -> Self {
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// First-order low-pass stored as a degenerate biquad
    fn first_order(w0: f64) -> Self {
        let k = (w0 / 2.0).tan();
        Self {
            b0: k / (1.0 + k),
            b1: k / (1.0 + k),
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    /// Load the delay line with the steady state for a constant input
    fn settle_to(&mut self, value: f64) {
        self.x1 = value;
        self.x2 = value;
        self.y1 = value;
        self.y2 = value;
    }
}

/// Single-pole RC smoother: `y += alpha * (x - y)`
#[derive(Debug, Clone)]
pub struct RcLowPass {
    alpha: f64,
    state: Option<f64>,
}

impl RcLowPass {
    pub fn new(cutoff_hz: f64, sampling_rate: f64) -> Self {
        let dt = 1.0 / sampling_rate;
        let tau = 1.0 / (2.0 * PI * cutoff_hz);
        Self {
            alpha: dt / (tau + dt),
            state: None,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl SampleFilter for RcLowPass {
    fn filter(&mut self, value: f64) -> f64 {
        let next = match self.state {
            Some(prev) => prev + self.alpha * (value - prev),
            None => value,
        };
        self.state = Some(next);
        next
    }

    fn reset(&mut self) {
        self.state = None;
    }
}

#[derive(Debug, Clone)]
enum LowPassStage {
    Iir {
        sections: Vec<Biquad>,
        primed: bool,
    },
    Rc(RcLowPass),
}

/// Butterworth low-pass filter
///
/// The IIR design cascades bilinear-transform sections; the delay line is
/// primed with the first sample so a constant input passes through without a
/// start-up transient.
#[derive(Debug, Clone)]
pub struct ButterworthFilter {
    cutoff_hz: f64,
    sampling_rate: f64,
    order: usize,
    design: LowPassDesign,
    normalized_cutoff: f64,
    stage: LowPassStage,
}

impl ButterworthFilter {
    pub fn new(cutoff_hz: f64, sampling_rate: f64, order: usize, design: LowPassDesign) -> Self {
        let order = order.max(1);
        let normalized_cutoff = Self::normalize_cutoff(cutoff_hz, sampling_rate);
        let stage = Self::design_stage(normalized_cutoff, cutoff_hz, sampling_rate, order, design);
        Self {
            cutoff_hz,
            sampling_rate,
            order,
            design,
            normalized_cutoff,
            stage,
        }
    }

    /// Recompute coefficients and clear the delay line
    pub fn update_parameters(&mut self, cutoff_hz: f64, sampling_rate: f64, order: usize) {
        *self = Self::new(cutoff_hz, sampling_rate, order, self.design);
        log::info!(
            "[Filter] Butterworth updated: cutoff={}Hz, rate={}Hz, order={}",
            cutoff_hz,
            sampling_rate,
            self.order
        );
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Cutoff as a fraction of Nyquist after clamping
    pub fn normalized_cutoff(&self) -> f64 {
        self.normalized_cutoff
    }

    fn normalize_cutoff(cutoff_hz: f64, sampling_rate: f64) -> f64 {
        let nyquist = sampling_rate / 2.0;
        let normalized = cutoff_hz / nyquist;
        if normalized >= 1.0 {
            log::warn!(
                "[Filter] Butterworth cutoff {}Hz reaches Nyquist ({}Hz); clamping normalized cutoff to {}",
                cutoff_hz,
                nyquist,
                MAX_NORMALIZED_CUTOFF
            );
            MAX_NORMALIZED_CUTOFF
        } else {
            normalized
        }
    }

    fn design_stage(
        normalized_cutoff: f64,
        cutoff_hz: f64,
        sampling_rate: f64,
        order: usize,
        design: LowPassDesign,
    ) -> LowPassStage {
        match design {
            LowPassDesign::FirstOrderRc => LowPassStage::Rc(RcLowPass::new(cutoff_hz, sampling_rate)),
            LowPassDesign::Iir => {
                let w0 = PI * normalized_cutoff;
                let mut sections = Vec::with_capacity(order / 2 + order % 2);
                for k in 1..=order / 2 {
                    let angle = (2 * k - 1) as f64 * PI / (2 * order) as f64;
                    let q = 1.0 / (2.0 * angle.sin());
                    sections.push(Biquad::lowpass(w0, q));
                }
                if order % 2 == 1 {
                    sections.push(Biquad::first_order(w0));
                }
                LowPassStage::Iir {
                    sections,
                    primed: false,
                }
            }
        }
    }
}

impl SampleFilter for ButterworthFilter {
    fn filter(&mut self, value: f64) -> f64 {
        match &mut self.stage {
            LowPassStage::Rc(rc) => rc.filter(value),
            LowPassStage::Iir { sections, primed } => {
                if !*primed {
                    sections.iter_mut().for_each(|s| s.settle_to(value));
                    *primed = true;
                }
                sections.iter_mut().fold(value, |x, s| s.process(x))
            }
        }
    }

    fn reset(&mut self) {
        match &mut self.stage {
            LowPassStage::Rc(rc) => rc.reset(),
            LowPassStage::Iir { sections, primed } => {
                sections.iter_mut().for_each(|s| s.settle_to(0.0));
                *primed = false;
            }
        }
    }
}

/// Configured filter slot of the pipeline
#[derive(Debug, Clone)]
pub enum SignalFilter {
    MovingAverage(MovingAverageFilter),
    Median(MedianFilter),
    Butterworth(ButterworthFilter),
}

impl SignalFilter {
    /// Build the filter selected by `config`; `FilterType::None` yields `None`
    pub fn from_config(config: &ProcessingConfig) -> Option<Self> {
        match config.filter_type {
            FilterType::None => None,
            FilterType::MovingAverage => Some(SignalFilter::MovingAverage(
                MovingAverageFilter::new(config.filter_window),
            )),
            FilterType::Median => Some(SignalFilter::Median(MedianFilter::new(
                config.filter_window,
            ))),
            FilterType::Butterworth => Some(SignalFilter::Butterworth(ButterworthFilter::new(
                config.butterworth_cutoff,
                config.sampling_rate,
                config.butterworth_order,
                config.lowpass_design,
            ))),
        }
    }

    pub fn as_butterworth_mut(&mut self) -> Option<&mut ButterworthFilter> {
        match self {
            SignalFilter::Butterworth(filter) => Some(filter),
            _ => None,
        }
    }
}

impl SampleFilter for SignalFilter {
    fn filter(&mut self, value: f64) -> f64 {
        match self {
            SignalFilter::MovingAverage(f) => f.filter(value),
            SignalFilter::Median(f) => f.filter(value),
            SignalFilter::Butterworth(f) => f.filter(value),
        }
    }

    fn reset(&mut self) {
        match self {
            SignalFilter::MovingAverage(f) => f.reset(),
            SignalFilter::Median(f) => f.reset(),
            SignalFilter::Butterworth(f) => f.reset(),
        }
    }
}

#[cfg(test)]
#[path = "filters_tests.rs"]
mod tests;
