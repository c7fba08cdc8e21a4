pub mod adapters;
pub mod command_wifi;
#[cfg(target_os = "macos")]
pub mod coreaudio;
pub mod listeners;
#[cfg(target_os = "linux")]
pub mod networkmanager;
pub mod platform;
pub mod traits;
#[cfg(not(target_os = "macos"))]
pub mod wpctl;

// Mock implementations for testing
#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks;

// Re-export traits and adapters for easy access
pub use adapters::*;
pub use command_wifi::CommandWifiSystem;
pub use listeners::ListenerRegistry;
#[cfg(target_os = "linux")]
pub use networkmanager::NetworkManagerWifiSystem;
pub use platform::PlatformWifiSystem;
pub use traits::*;

#[cfg(target_os = "macos")]
pub use coreaudio::CoreAudioSystem;
#[cfg(not(target_os = "macos"))]
pub use wpctl::WpctlAudioSystem;

/// Native audio backend for the current platform.
#[cfg(target_os = "macos")]
pub type PlatformAudioSystem = CoreAudioSystem;
#[cfg(not(target_os = "macos"))]
pub type PlatformAudioSystem = WpctlAudioSystem;

// Re-export mocks when testing
#[cfg(any(test, feature = "test-mocks"))]
pub use mocks::*;
