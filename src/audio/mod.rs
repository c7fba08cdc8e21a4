pub mod monitor;

pub use monitor::{AudioMonitor, DEFAULT_POLL_INTERVAL, MonitorMode};
