use futures::Stream;
use tokio::runtime::Builder;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::events::{CalibrationEvent, ProcessorEvent};

use super::MonitorHandle;

/// Forward a broadcast receiver into an unbounded mpsc channel on a helper
/// thread, so consumers without a runtime can still `recv` or build a Stream.
///
/// Lagged receivers skip the lost messages and keep forwarding.
fn forward<T: Clone + Send + 'static>(
    mut broadcast_rx: broadcast::Receiver<T>,
) -> mpsc::UnboundedReceiver<T> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let rt = match Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(err) => {
                log::error!("[MonitorHandle] Failed to create Tokio runtime: {}", err);
                return;
            }
        };
        rt.block_on(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("[MonitorHandle] Subscriber lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    });

    rx
}

impl MonitorHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    /// Raw broadcast receiver for processor events.
    pub fn processor_receiver(&self) -> Option<broadcast::Receiver<ProcessorEvent>> {
        self.broadcasts.subscribe_processor()
    }

    /// Raw broadcast receiver for calibration events.
    pub fn calibration_receiver(&self) -> Option<broadcast::Receiver<CalibrationEvent>> {
        self.broadcasts.subscribe_calibration()
    }

    pub fn subscribe_processor(&self) -> mpsc::UnboundedReceiver<ProcessorEvent> {
        match self.broadcasts.subscribe_processor() {
            Some(rx) => forward(rx),
            None => mpsc::unbounded_channel().1,
        }
    }

    pub fn subscribe_calibration(&self) -> mpsc::UnboundedReceiver<CalibrationEvent> {
        match self.broadcasts.subscribe_calibration() {
            Some(rx) => forward(rx),
            None => mpsc::unbounded_channel().1,
        }
    }

    // ========================================================================
    // ASYNC STREAM ADAPTERS
    // ========================================================================

    pub fn processor_stream(&self) -> impl Stream<Item = ProcessorEvent> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_processor())
    }

    pub fn calibration_stream(&self) -> impl Stream<Item = CalibrationEvent> + Unpin {
        UnboundedReceiverStream::new(self.subscribe_calibration())
    }
}
