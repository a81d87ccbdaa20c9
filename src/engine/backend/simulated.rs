use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::now_unix_seconds;
use crate::error::SourceError;
use crate::processing::RawSample;

use super::{
    lock_thread, pause, push_sample, LinkCounters, LinkMetrics, SampleSource, SourceThread,
};

/// Shape of the synthetic load-cell signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Sensor output with nothing on the scale
    pub baseline: f64,
    /// Sensor units per gram
    pub gain_per_gram: f64,
    /// Half-width of the uniform noise band
    pub noise: f64,
    pub rate_hz: f64,
    /// Stop after this many samples; runs until stopped when None
    pub max_samples: Option<u64>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            baseline: 0.5,
            gain_per_gram: 0.002,
            noise: 0.0005,
            rate_hz: 100.0,
            max_samples: None,
        }
    }
}

/// Adjusts the simulated load while the source runs.
#[derive(Clone)]
pub struct LoadHandle {
    grams: Arc<AtomicU64>,
}

impl LoadHandle {
    pub fn set_grams(&self, grams: f64) {
        self.grams.store(grams.to_bits(), Ordering::SeqCst);
    }

    pub fn grams(&self) -> f64 {
        f64::from_bits(self.grams.load(Ordering::SeqCst))
    }
}

/// Synthetic load cell emitting text lines like a serial device would.
pub struct SimulatedSource {
    config: SimulatedConfig,
    load: LoadHandle,
    running: Arc<AtomicBool>,
    counters: Arc<LinkCounters>,
    thread: Mutex<Option<SourceThread>>,
}

impl SimulatedSource {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            load: LoadHandle {
                grams: Arc::new(AtomicU64::new(0.0f64.to_bits())),
            },
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(LinkCounters::default()),
            thread: Mutex::new(None),
        }
    }

    pub fn load_handle(&self) -> LoadHandle {
        self.load.clone()
    }

    /// Noise-free sensor output for `grams`
    pub fn expected_reading(&self, grams: f64) -> f64 {
        self.config.baseline + self.config.gain_per_gram * grams
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

impl SampleSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn start(&self, mut producer: rtrb::Producer<RawSample>) -> Result<(), SourceError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        if let Some(previous) = lock_thread(&self.thread).take() {
            previous.retire();
        }
        self.counters.mark_started();

        let config = self.config.clone();
        let load = self.load.clone();
        let running = Arc::clone(&self.running);
        let counters = Arc::clone(&self.counters);
        let interval = Duration::from_secs_f64(1.0 / config.rate_hz.max(f64::EPSILON));

        let spawned = SourceThread::spawn("simulated", true, move |cancel| {
            let mut rng = rand::thread_rng();
            let mut emitted: u64 = 0;
            while !cancel.load(Ordering::SeqCst) {
                if config.max_samples.is_some_and(|max| emitted >= max) {
                    break;
                }
                let noise = if config.noise > 0.0 {
                    rng.gen_range(-config.noise..=config.noise)
                } else {
                    0.0
                };
                let value = config.baseline + config.gain_per_gram * load.grams() + noise;
                let line = format!("{:.6}", value);

                counters.record_packet(line.len() + 1);
                push_sample(
                    &mut producer,
                    &counters,
                    RawSample::text(line, now_unix_seconds()),
                );
                emitted += 1;
                pause(interval, &cancel);
            }
            if !cancel.load(Ordering::SeqCst) {
                running.store(false, Ordering::SeqCst);
            }
            log::info!("[SimulatedSource] Stopped after {} samples", emitted);
        });

        match spawned {
            Ok(thread) => {
                *lock_thread(&self.thread) = Some(thread);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn stop(&self) -> Result<(), SourceError> {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if let Some(thread) = lock_thread(&self.thread).take() {
            thread.retire();
        }
        if !was_running {
            return Err(SourceError::NotRunning);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn metrics(&self) -> LinkMetrics {
        self.counters.snapshot()
    }
}
