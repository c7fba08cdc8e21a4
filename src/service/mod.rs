pub mod daemon;
pub mod signals;

pub use daemon::MonitorService;
pub use signals::{SignalHandler, SignalType};
