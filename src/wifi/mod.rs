pub mod monitor;

pub use monitor::WifiMonitor;
