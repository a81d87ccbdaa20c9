// Managers Module
//
// Focused manager types owned by MonitorHandle.
//
// Each manager handles one specific concern:
// - CalibrationManager: thread-safe ownership of the calibration engine and
//   calibration file persistence
// - BroadcastChannelManager: Tokio broadcast channel management

pub mod broadcast_manager;
pub mod calibration_manager;

pub use broadcast_manager::BroadcastChannelManager;
pub use calibration_manager::CalibrationManager;
