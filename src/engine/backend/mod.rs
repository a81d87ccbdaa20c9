//! Sample source abstractions for the monitor core.
//!
//! A source owns the producer half of an `rtrb` ring and pushes
//! [`RawSample`]s from its own thread; the monitor worker owns the consumer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::processing::RawSample;

mod line_reader;
mod simulated;

pub use line_reader::{LineReaderSource, Overflow};
pub use simulated::{LoadHandle, SimulatedConfig, SimulatedSource};

/// Trait implemented by raw sample sources (serial port, file replay, simulator).
///
/// Each source is responsible for delivering samples into the ring it is
/// given on [`start`](SampleSource::start). Live sources drop and count a
/// sample when the ring is full; finite recordings may wait for the consumer.
/// After [`stop`](SampleSource::stop) returns, the source no longer writes to
/// the ring of that run.
pub trait SampleSource: Send + Sync {
    fn name(&self) -> &str;
    fn start(&self, producer: rtrb::Producer<RawSample>) -> Result<(), SourceError>;
    fn stop(&self) -> Result<(), SourceError>;
    /// False once stopped or once a finite input is exhausted
    fn is_running(&self) -> bool;
    fn metrics(&self) -> LinkMetrics;
}

/// Link statistics snapshot for a sample source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkMetrics {
    pub bytes_received: u64,
    pub packets_received: u64,
    pub errors: u64,
    pub dropped_samples: u64,
    pub uptime_secs: f64,
}

impl LinkMetrics {
    /// Bytes per second since the source started
    pub fn data_rate(&self) -> f64 {
        if self.uptime_secs > 0.0 {
            self.bytes_received as f64 / self.uptime_secs
        } else {
            0.0
        }
    }

    /// Lines per second since the source started
    pub fn packet_rate(&self) -> f64 {
        if self.uptime_secs > 0.0 {
            self.packets_received as f64 / self.uptime_secs
        } else {
            0.0
        }
    }
}

/// Counters shared between a source and its reader thread.
#[derive(Default)]
pub(crate) struct LinkCounters {
    bytes: AtomicU64,
    packets: AtomicU64,
    errors: AtomicU64,
    dropped: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl LinkCounters {
    pub(crate) fn mark_started(&self) {
        self.bytes.store(0, Ordering::Relaxed);
        self.packets.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    pub(crate) fn record_packet(&self, bytes: usize) {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LinkMetrics {
        let uptime_secs = self
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        LinkMetrics {
            bytes_received: self.bytes.load(Ordering::Relaxed),
            packets_received: self.packets.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            dropped_samples: self.dropped.load(Ordering::Relaxed),
            uptime_secs,
        }
    }
}

/// Longest uninterrupted sleep of a producer thread
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Push into the ring, counting a drop when the consumer has fallen behind
pub(crate) fn push_sample(
    producer: &mut rtrb::Producer<RawSample>,
    counters: &LinkCounters,
    sample: RawSample,
) {
    if producer.push(sample).is_err() {
        counters.record_drop();
    }
}

/// Push into the ring, waiting for the consumer to free a slot
///
/// Returns false (counting the sample as dropped) when `cancel` is raised
/// while waiting.
pub(crate) fn push_sample_blocking(
    producer: &mut rtrb::Producer<RawSample>,
    counters: &LinkCounters,
    mut sample: RawSample,
    cancel: &AtomicBool,
) -> bool {
    loop {
        match producer.push(sample) {
            Ok(()) => return true,
            Err(rtrb::PushError::Full(rejected)) => {
                if cancel.load(Ordering::SeqCst) {
                    counters.record_drop();
                    return false;
                }
                sample = rejected;
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

/// Sleep for `duration`, waking early once `cancel` is raised
pub(crate) fn pause(duration: Duration, cancel: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !cancel.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(CANCEL_POLL));
    }
}

/// Producer thread of one source run plus its private cancel flag.
///
/// Each run gets a fresh flag, so a thread from an earlier run can never be
/// revived by a later `start`.
pub(crate) struct SourceThread {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    /// False when the thread may sit in a blocking read (stdin, pipes, ttys)
    joinable: bool,
}

impl SourceThread {
    pub(crate) fn spawn<F>(source_name: &str, joinable: bool, body: F) -> Result<Self, SourceError>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let handle = std::thread::Builder::new()
            .name(format!("source-{}", source_name))
            .spawn(move || body(flag))
            .map_err(|err| SourceError::Io {
                source_name: source_name.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            cancel,
            handle,
            joinable,
        })
    }

    /// Cancel the run and join the thread
    ///
    /// A thread that may be parked in a blocking read is left to exit on its
    /// own once the read returns; it no longer touches shared state.
    pub(crate) fn retire(self) {
        self.cancel.store(true, Ordering::SeqCst);
        if self.joinable || self.handle.is_finished() {
            if self.handle.join().is_err() {
                log::error!("[SampleSource] Producer thread panicked");
            }
        } else {
            log::debug!("[SampleSource] Detaching producer blocked on input");
        }
    }
}

pub(crate) fn lock_thread(slot: &Mutex<Option<SourceThread>>) -> MutexGuard<'_, Option<SourceThread>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}
