pub mod audio;
pub mod change;
pub mod network;

pub use audio::AudioDeviceState;
pub use change::{ChangeDetector, has_changed};
pub use network::NetworkState;
