use anyhow::Result;
use std::path::Path;

use crate::error::NativeError;

/// Callback invoked by a native source on a thread it owns.
pub type NativeCallback = Box<dyn Fn() + Send + Sync>;

/// Handle returned when registering a native listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// One row of the platform's interface enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConnection {
    pub interface_id: String,
    pub is_connected: bool,
    /// Connected profile or SSID; empty when not connected.
    pub profile_name: String,
}

impl InterfaceConnection {
    pub fn connected(interface_id: impl Into<String>, profile_name: impl Into<String>) -> Self {
        Self {
            interface_id: interface_id.into(),
            is_connected: true,
            profile_name: profile_name.into(),
        }
    }

    pub fn disconnected(interface_id: impl Into<String>) -> Self {
        Self {
            interface_id: interface_id.into(),
            is_connected: false,
            profile_name: String::new(),
        }
    }
}

/// Trait for connectivity enumeration - abstracts nmcli, networksetup and friends
pub trait WifiSystemInterface: Send + Sync + 'static {
    /// Enumerate all wireless interfaces in platform order
    fn enumerate_interfaces(&self) -> Result<Vec<InterfaceConnection>, NativeError>;

    /// Register a callback for "connection changed" notifications.
    /// The payload is intentionally absent: listeners re-enumerate.
    fn add_connection_listener(&self, callback: NativeCallback) -> Result<ListenerId, NativeError>;

    /// Unregister a listener; unknown ids are ignored
    fn remove_listener(&self, id: ListenerId);
}

/// Identity of the default playback device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaybackDevice {
    pub id: String,
    pub name: String,
}

impl PlaybackDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Volume and mute as read from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeReading {
    pub volume_percent: u8,
    pub is_muted: bool,
}

/// Trait for audio control - abstracts CoreAudio and PipeWire interactions
pub trait AudioSystemInterface: Send + Sync + 'static {
    /// Current default playback device, `None` when the system has none
    fn default_playback_device(&self) -> Result<Option<PlaybackDevice>, NativeError>;

    fn read_volume(&self, device: &PlaybackDevice) -> Result<VolumeReading, NativeError>;

    /// Set the device volume in percent (already validated to 0..=100)
    fn write_volume(&self, device: &PlaybackDevice, percent: u8) -> Result<(), NativeError>;

    fn write_mute(&self, device: &PlaybackDevice, muted: bool) -> Result<(), NativeError>;

    /// Register a callback for default playback device changes
    fn add_default_device_listener(
        &self,
        callback: NativeCallback,
    ) -> Result<ListenerId, NativeError>;

    /// Register a callback for volume/mute changes on one device
    fn add_volume_listener(
        &self,
        device: &PlaybackDevice,
        callback: NativeCallback,
    ) -> Result<ListenerId, NativeError>;

    fn remove_listener(&self, id: ListenerId);

    /// Whether listeners are ever invoked. When false the monitor polls.
    fn supports_change_notifications(&self) -> bool {
        true
    }
}

/// Trait for file system operations - abstracts std::fs for testability
pub trait FileSystemInterface {
    /// Read the entire contents of a configuration file
    fn read_config_file(&self, path: &Path) -> Result<String>;

    /// Write configuration content to a file
    fn write_config_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Check if a configuration file exists
    fn config_file_exists(&self, path: &Path) -> bool;

    /// Create the directory structure for config files
    fn create_config_dir(&self, path: &Path) -> Result<()>;

    /// Get the last modified time of a config file (for watching changes)
    fn get_config_modified_time(&self, path: &Path) -> Result<std::time::SystemTime>;
}
