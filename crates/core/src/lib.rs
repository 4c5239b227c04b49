//! The pooler's time-critical core: block discovery (monitor), per-block
//! work scheduling (scheduler) and batch lifecycle plus Backend reporting
//! (coordinator).

pub mod coordinator;
pub mod monitor;
pub mod scheduler;
pub mod stats;

pub use coordinator::{Coordinator, WorkStatusSnapshot};
pub use monitor::{BlockMonitor, MonitorConfig};
pub use scheduler::{WorkConfig, WorkScheduler};
pub use stats::{MonitorState, MonitorStats};
