use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::now_unix_seconds;
use crate::error::SourceError;
use crate::processing::RawSample;

use super::{
    lock_thread, pause, push_sample, push_sample_blocking, LinkCounters, LinkMetrics,
    SampleSource, SourceThread,
};

enum LineInput {
    Path(PathBuf),
    Stdin,
}

/// What the reader does when the sample ring is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Wait for the consumer to catch up; no sample is lost
    Wait,
    /// Drop the sample and count it, as a live link would
    Drop,
}

/// Line-delimited ASCII sample source.
///
/// Reads one value per line from a file (a captured serial log, a named pipe,
/// a tty device already configured by the caller) or from stdin. Lines are
/// forwarded unparsed so malformed input surfaces as a processing error
/// downstream instead of being silently discarded here.
///
/// Regular files are replayed with [`Overflow::Wait`]; pipes, devices and
/// stdin default to [`Overflow::Drop`].
pub struct LineReaderSource {
    name: String,
    input: LineInput,
    pacing: Option<Duration>,
    overflow: Option<Overflow>,
    running: Arc<AtomicBool>,
    counters: Arc<LinkCounters>,
    thread: Mutex<Option<SourceThread>>,
}

impl LineReaderSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::with_input(path.display().to_string(), LineInput::Path(path))
    }

    pub fn stdin() -> Self {
        Self::with_input("stdin".to_string(), LineInput::Stdin)
    }

    fn with_input(name: String, input: LineInput) -> Self {
        Self {
            name,
            input,
            pacing: None,
            overflow: None,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(LinkCounters::default()),
            thread: Mutex::new(None),
        }
    }

    /// Sleep `interval` after each delivered line (replaying a recording in real time)
    pub fn with_pacing(mut self, interval: Duration) -> Self {
        self.pacing = Some(interval);
        self
    }

    /// Override the full-ring policy picked from the input kind
    pub fn with_overflow(mut self, overflow: Overflow) -> Self {
        self.overflow = Some(overflow);
        self
    }

    /// Open the input; the flag is true for regular files, whose reads never
    /// block indefinitely
    fn open(&self) -> Result<(Box<dyn BufRead + Send>, bool), SourceError> {
        let io_error = |err: io::Error| SourceError::Io {
            source_name: self.name.clone(),
            reason: err.to_string(),
        };
        match &self.input {
            LineInput::Path(path) => {
                let file = File::open(path).map_err(io_error)?;
                let regular = file.metadata().map_err(io_error)?.is_file();
                Ok((Box::new(BufReader::new(file)), regular))
            }
            LineInput::Stdin => Ok((Box::new(BufReader::new(io::stdin())), false)),
        }
    }
}

impl SampleSource for LineReaderSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, mut producer: rtrb::Producer<RawSample>) -> Result<(), SourceError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        if let Some(previous) = lock_thread(&self.thread).take() {
            previous.retire();
        }

        let (mut reader, regular_file) = match self.open() {
            Ok(opened) => opened,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };
        let overflow = self.overflow.unwrap_or(if regular_file {
            Overflow::Wait
        } else {
            Overflow::Drop
        });
        self.counters.mark_started();

        let name = self.name.clone();
        let pacing = self.pacing;
        let running = Arc::clone(&self.running);
        let counters = Arc::clone(&self.counters);

        let spawned = SourceThread::spawn(&self.name, regular_file, move |cancel| {
            log::info!("[LineReader] Reading samples from {} ({:?} when full)", name, overflow);
            let mut line = String::new();
            while !cancel.load(Ordering::SeqCst) {
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) => {
                        log::info!("[LineReader] End of input on {}", name);
                        break;
                    }
                    Ok(bytes) => {
                        counters.record_packet(bytes);
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        let sample = RawSample::text(trimmed, now_unix_seconds());
                        match overflow {
                            Overflow::Wait => {
                                if !push_sample_blocking(&mut producer, &counters, sample, &cancel)
                                {
                                    break;
                                }
                            }
                            Overflow::Drop => push_sample(&mut producer, &counters, sample),
                        }
                        if let Some(interval) = pacing {
                            pause(interval, &cancel);
                        }
                    }
                    // Non UTF-8 garbage on the line; the bytes are consumed
                    Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                        counters.record_error();
                    }
                    Err(err) => {
                        counters.record_error();
                        log::error!("[LineReader] Read failed on {}: {}", name, err);
                        break;
                    }
                }
            }
            // A cancelled run leaves the flag to whoever stopped or restarted it
            if !cancel.load(Ordering::SeqCst) {
                running.store(false, Ordering::SeqCst);
            }
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
        log::info!("[LineReader] Stopped {}", self.name);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn metrics(&self) -> LinkMetrics {
        self.counters.snapshot()
    }
}
