// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::events::{CalibrationEvent, ProcessorEvent};

/// Buffer for processor events; sized for a few seconds of a fast serial feed
pub const PROCESSOR_CHANNEL_CAPACITY: usize = 1024;

/// Buffer for calibration events (progress ticks plus accepted readings)
pub const CALIBRATION_CHANNEL_CAPACITY: usize = 512;

type SenderSlot<T> = Arc<Mutex<Option<broadcast::Sender<T>>>>;

/// Manages the tokio broadcast channels the monitor publishes on
///
/// # Channel Types
/// - Processor: processed samples, outliers, statistics, processing errors
/// - Calibration: engine state changes, progress, collected points, results
///
/// Channels must be explicitly initialized via `init_*` before anyone can
/// subscribe. Lagging subscribers lose the oldest messages.
pub struct BroadcastChannelManager {
    processor: SenderSlot<ProcessorEvent>,
    calibration: SenderSlot<CalibrationEvent>,
}

impl BroadcastChannelManager {
    /// Create a new BroadcastChannelManager with all channels uninitialized
    pub fn new() -> Self {
        Self {
            processor: Arc::new(Mutex::new(None)),
            calibration: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // PROCESSOR CHANNEL
    // ========================================================================

    /// Initialize the processor event channel
    ///
    /// Re-initializing replaces the sender; existing receivers see the old
    /// channel close once every clone of the old sender is dropped.
    pub fn init_processor(&self) -> broadcast::Sender<ProcessorEvent> {
        let (tx, _) = broadcast::channel(PROCESSOR_CHANNEL_CAPACITY);
        *slot(&self.processor) = Some(tx.clone());
        tx
    }

    /// Subscribe to processor events, or None before `init_processor`
    pub fn subscribe_processor(&self) -> Option<broadcast::Receiver<ProcessorEvent>> {
        slot(&self.processor).as_ref().map(|tx| tx.subscribe())
    }

    pub fn get_processor_sender(&self) -> Option<broadcast::Sender<ProcessorEvent>> {
        slot(&self.processor).clone()
    }

    // ========================================================================
    // CALIBRATION CHANNEL
    // ========================================================================

    /// Initialize the calibration event channel
    pub fn init_calibration(&self) -> broadcast::Sender<CalibrationEvent> {
        let (tx, _) = broadcast::channel(CALIBRATION_CHANNEL_CAPACITY);
        *slot(&self.calibration) = Some(tx.clone());
        tx
    }

    /// Subscribe to calibration events, or None before `init_calibration`
    pub fn subscribe_calibration(&self) -> Option<broadcast::Receiver<CalibrationEvent>> {
        slot(&self.calibration).as_ref().map(|tx| tx.subscribe())
    }

    pub fn get_calibration_sender(&self) -> Option<broadcast::Sender<CalibrationEvent>> {
        slot(&self.calibration).clone()
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Senders are only ever replaced whole, so a poisoned slot is still usable
fn slot<T>(slot: &SenderSlot<T>) -> MutexGuard<'_, Option<broadcast::Sender<T>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationState;

    #[test]
    fn test_processor_channel_lifecycle() {
        let manager = BroadcastChannelManager::new();

        // Initially no subscription possible
        assert!(manager.subscribe_processor().is_none());
        assert!(manager.get_processor_sender().is_none());

        let _tx = manager.init_processor();
        assert!(manager.subscribe_processor().is_some());
        assert!(manager.get_processor_sender().is_some());
    }

    #[test]
    fn test_processor_multiple_subscribers() {
        let manager = BroadcastChannelManager::new();
        let tx = manager.init_processor();

        let mut rx1 = manager.subscribe_processor().unwrap();
        let mut rx2 = manager.subscribe_processor().unwrap();

        let event = ProcessorEvent::CalibrationStatusChanged { calibrated: true };
        tx.send(event.clone()).unwrap();

        assert_eq!(rx1.try_recv().unwrap(), event);
        assert_eq!(rx2.try_recv().unwrap(), event);
    }

    #[test]
    fn test_calibration_channel_lifecycle() {
        let manager = BroadcastChannelManager::new();
        assert!(manager.subscribe_calibration().is_none());

        manager.init_calibration();
        let mut rx = manager.subscribe_calibration().unwrap();

        let sender = manager.get_calibration_sender().unwrap();
        sender
            .send(CalibrationEvent::StateChanged(CalibrationState::Collecting))
            .unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            CalibrationEvent::StateChanged(CalibrationState::Collecting)
        );
    }

    #[test]
    fn test_default_implementation() {
        let manager = BroadcastChannelManager::default();
        assert!(manager.subscribe_processor().is_none());
        assert!(manager.subscribe_calibration().is_none());
    }
}
