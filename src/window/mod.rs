/// Resident window management
///
/// - Release/preload passes and pagination as the viewing index moves (manager.rs)
/// - Shrinking the window under memory pressure (pressure.rs)

pub mod manager;
pub mod pressure;

pub use manager::WindowManager;
pub use pressure::{MemoryPressureAdapter, PressureLevel};
