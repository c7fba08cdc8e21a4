pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{AgentConfig, AudioConfig, AudioMode, Config, DispatchKind, GeneralConfig, WifiConfig};
