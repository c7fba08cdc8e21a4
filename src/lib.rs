pub mod agent;
pub mod audio;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod model;
pub mod service;
pub mod state;
pub mod system;
pub mod wifi;

pub use agent::{MuteControl, MutePolicy, PolicyAgent};
pub use audio::{AudioMonitor, MonitorMode};
pub use config::Config;
pub use dispatch::{DispatchBridge, DispatchMode, Dispatcher, WorkerDispatcher};
pub use error::{ErrorKind, NativeError};
pub use model::{ObservableModel, StateChange, Subscription};
pub use service::MonitorService;
pub use state::{AudioDeviceState, NetworkState};
pub use wifi::WifiMonitor;
