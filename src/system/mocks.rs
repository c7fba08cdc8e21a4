use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::listeners::ListenerRegistry;
use crate::error::NativeError;
use crate::system::traits::{
    AudioSystemInterface, FileSystemInterface, InterfaceConnection, ListenerId, NativeCallback,
    PlaybackDevice, VolumeReading, WifiSystemInterface,
};

/// Mock connectivity source for testing - controllable interfaces and notifications
#[derive(Clone)]
pub struct MockWifiSystem {
    pub interfaces: Arc<Mutex<Vec<InterfaceConnection>>>,
    pub listeners: ListenerRegistry,
    pub enumeration_failure: Arc<Mutex<Option<NativeError>>>,
    pub listener_failure: Arc<Mutex<Option<NativeError>>>,
    pub enumerate_calls: Arc<AtomicUsize>,
}

impl MockWifiSystem {
    pub fn new() -> Self {
        Self {
            interfaces: Arc::new(Mutex::new(Vec::new())),
            listeners: ListenerRegistry::new(),
            enumeration_failure: Arc::new(Mutex::new(None)),
            listener_failure: Arc::new(Mutex::new(None)),
            enumerate_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mock with a single wireless interface connected to `ssid`
    pub fn connected_to(ssid: &str) -> Self {
        let mock = Self::new();
        mock.set_interfaces(vec![InterfaceConnection::connected("wlan0", ssid)]);
        mock
    }

    /// Replace the enumerated interfaces without notifying
    pub fn set_interfaces(&self, interfaces: Vec<InterfaceConnection>) {
        *self.interfaces.lock().unwrap() = interfaces;
    }

    /// Join `ssid` on wlan0 and raise a connection notification
    pub fn join(&self, ssid: &str) {
        self.set_interfaces(vec![InterfaceConnection::connected("wlan0", ssid)]);
        self.trigger_connection_change();
    }

    /// Drop every connection and raise a connection notification
    pub fn leave(&self) {
        self.set_interfaces(vec![InterfaceConnection::disconnected("wlan0")]);
        self.trigger_connection_change();
    }

    /// Invoke every registered listener, as the platform would
    pub fn trigger_connection_change(&self) -> usize {
        self.listeners.fire_all()
    }

    /// Configure enumeration to fail (None restores normal behavior)
    pub fn set_enumeration_failure(&self, failure: Option<NativeError>) {
        *self.enumeration_failure.lock().unwrap() = failure;
    }

    /// Configure listener registration to fail
    pub fn set_listener_failure(&self, failure: Option<NativeError>) {
        *self.listener_failure.lock().unwrap() = failure;
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn enumerate_call_count(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }
}

impl WifiSystemInterface for MockWifiSystem {
    fn enumerate_interfaces(&self) -> Result<Vec<InterfaceConnection>, NativeError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.enumeration_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(self.interfaces.lock().unwrap().clone())
    }

    fn add_connection_listener(&self, callback: NativeCallback) -> Result<ListenerId, NativeError> {
        if let Some(failure) = self.listener_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(self.listeners.add((), callback))
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

impl Default for MockWifiSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// A device known to the mock audio system
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub device: PlaybackDevice,
    pub volume_percent: u8,
    pub is_muted: bool,
}

/// Command recorded by the mock audio system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockAudioCall {
    SetVolume(u8),
    SetMute(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockListenerKind {
    DefaultDevice,
    Volume(String),
}

/// Mock audio system for testing - provides controllable device behavior
///
/// Writes do not raise notifications on their own; use
/// [`emit_volume_notification`](Self::emit_volume_notification) to simulate
/// the device echoing a change back.
#[derive(Clone)]
pub struct MockAudioSystem {
    pub devices: Arc<Mutex<Vec<MockDevice>>>,
    pub default_device: Arc<Mutex<Option<String>>>,
    pub listeners: ListenerRegistry<MockListenerKind>,
    pub calls: Arc<Mutex<Vec<MockAudioCall>>>,
    pub read_failure: Arc<Mutex<Option<NativeError>>>,
    pub write_failure: Arc<Mutex<Option<NativeError>>>,
    pub push_notifications: Arc<AtomicBool>,
}

impl MockAudioSystem {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(Mutex::new(Vec::new())),
            default_device: Arc::new(Mutex::new(None)),
            listeners: ListenerRegistry::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            read_failure: Arc::new(Mutex::new(None)),
            write_failure: Arc::new(Mutex::new(None)),
            push_notifications: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mock with one device that is already the default
    pub fn with_default_device(name: &str, volume_percent: u8, is_muted: bool) -> Self {
        let mock = Self::new();
        mock.add_device(name, name, volume_percent, is_muted);
        *mock.default_device.lock().unwrap() = Some(name.to_string());
        mock
    }

    /// Add a device to the mock system
    pub fn add_device(&self, id: &str, name: &str, volume_percent: u8, is_muted: bool) {
        self.devices.lock().unwrap().push(MockDevice {
            device: PlaybackDevice::new(id, name),
            volume_percent,
            is_muted,
        });
    }

    /// Make `id` the default device (None removes it) and notify default-device listeners
    pub fn switch_default_device(&self, id: Option<&str>) {
        *self.default_device.lock().unwrap() = id.map(str::to_string);
        self.listeners
            .fire_matching(|kind| *kind == MockListenerKind::DefaultDevice);
    }

    /// Change a device's volume/mute from "outside" and notify its listeners
    pub fn emit_volume_change(&self, id: &str, volume_percent: u8, is_muted: bool) {
        if let Some(device) = self
            .devices
            .lock()
            .unwrap()
            .iter_mut()
            .find(|d| d.device.id == id)
        {
            device.volume_percent = volume_percent;
            device.is_muted = is_muted;
        }
        self.emit_volume_notification(id);
    }

    /// Notify a device's volume listeners without changing anything
    pub fn emit_volume_notification(&self, id: &str) -> usize {
        self.listeners
            .fire_matching(|kind| matches!(kind, MockListenerKind::Volume(d) if d == id))
    }

    /// Current (volume, muted) of a device
    pub fn device_levels(&self, id: &str) -> Option<(u8, bool)> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.device.id == id)
            .map(|d| (d.volume_percent, d.is_muted))
    }

    /// Get all commands that were issued
    pub fn get_calls(&self) -> Vec<MockAudioCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Mute commands only, in order
    pub fn mute_calls(&self) -> Vec<bool> {
        self.get_calls()
            .into_iter()
            .filter_map(|call| match call {
                MockAudioCall::SetMute(muted) => Some(muted),
                _ => None,
            })
            .collect()
    }

    pub fn set_read_failure(&self, failure: Option<NativeError>) {
        *self.read_failure.lock().unwrap() = failure;
    }

    pub fn set_write_failure(&self, failure: Option<NativeError>) {
        *self.write_failure.lock().unwrap() = failure;
    }

    /// Pretend the platform cannot push change notifications
    pub fn set_push_notifications(&self, enabled: bool) {
        self.push_notifications.store(enabled, Ordering::SeqCst);
    }

    pub fn volume_listener_count(&self, id: &str) -> usize {
        self.listeners
            .count_matching(|kind| matches!(kind, MockListenerKind::Volume(d) if d == id))
    }

    pub fn default_listener_count(&self) -> usize {
        self.listeners
            .count_matching(|kind| *kind == MockListenerKind::DefaultDevice)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn with_device<T>(
        &self,
        device: &PlaybackDevice,
        f: impl FnOnce(&mut MockDevice) -> T,
    ) -> Result<T, NativeError> {
        let mut devices = self.devices.lock().unwrap();
        devices
            .iter_mut()
            .find(|d| d.device.id == device.id)
            .map(f)
            .ok_or(NativeError::NoDevice)
    }
}

impl AudioSystemInterface for MockAudioSystem {
    fn default_playback_device(&self) -> Result<Option<PlaybackDevice>, NativeError> {
        if let Some(failure) = self.read_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        let default = self.default_device.lock().unwrap().clone();
        Ok(default.and_then(|id| {
            self.devices
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.device.id == id)
                .map(|d| d.device.clone())
        }))
    }

    fn read_volume(&self, device: &PlaybackDevice) -> Result<VolumeReading, NativeError> {
        if let Some(failure) = self.read_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        self.with_device(device, |d| VolumeReading {
            volume_percent: d.volume_percent,
            is_muted: d.is_muted,
        })
    }

    fn write_volume(&self, device: &PlaybackDevice, percent: u8) -> Result<(), NativeError> {
        if let Some(failure) = self.write_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        self.calls
            .lock()
            .unwrap()
            .push(MockAudioCall::SetVolume(percent));
        self.with_device(device, |d| d.volume_percent = percent)
    }

    fn write_mute(&self, device: &PlaybackDevice, muted: bool) -> Result<(), NativeError> {
        if let Some(failure) = self.write_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        self.calls.lock().unwrap().push(MockAudioCall::SetMute(muted));
        self.with_device(device, |d| d.is_muted = muted)
    }

    fn add_default_device_listener(
        &self,
        callback: NativeCallback,
    ) -> Result<ListenerId, NativeError> {
        Ok(self.listeners.add(MockListenerKind::DefaultDevice, callback))
    }

    fn add_volume_listener(
        &self,
        device: &PlaybackDevice,
        callback: NativeCallback,
    ) -> Result<ListenerId, NativeError> {
        Ok(self
            .listeners
            .add(MockListenerKind::Volume(device.id.clone()), callback))
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn supports_change_notifications(&self) -> bool {
        self.push_notifications.load(Ordering::SeqCst)
    }
}

impl Default for MockAudioSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock file system for testing - provides controllable file operations
#[derive(Clone)]
pub struct MockFileSystem {
    pub files: Arc<Mutex<HashMap<PathBuf, String>>>,
    pub read_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub write_calls: Arc<Mutex<Vec<(PathBuf, String)>>>,
    pub directory_creation_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub should_fail_read: Arc<Mutex<bool>>,
    pub should_fail_write: Arc<Mutex<bool>>,
    pub should_fail_create_dir: Arc<Mutex<bool>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            read_calls: Arc::new(Mutex::new(Vec::new())),
            write_calls: Arc::new(Mutex::new(Vec::new())),
            directory_creation_calls: Arc::new(Mutex::new(Vec::new())),
            should_fail_read: Arc::new(Mutex::new(false)),
            should_fail_write: Arc::new(Mutex::new(false)),
            should_fail_create_dir: Arc::new(Mutex::new(false)),
        }
    }

    /// Add a file to the mock file system
    pub fn add_file<P: AsRef<Path>>(&self, path: P, content: String) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), content);
    }

    /// Get all write calls that were made
    pub fn get_write_calls(&self) -> Vec<(PathBuf, String)> {
        self.write_calls.lock().unwrap().clone()
    }

    /// Get all directory creation calls that were made
    pub fn get_directory_creation_calls(&self) -> Vec<PathBuf> {
        self.directory_creation_calls.lock().unwrap().clone()
    }

    /// Configure the mock to fail read operations
    pub fn set_read_failure(&self, should_fail: bool) {
        *self.should_fail_read.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail write operations
    pub fn set_write_failure(&self, should_fail: bool) {
        *self.should_fail_write.lock().unwrap() = should_fail;
    }

    /// Configure the mock to fail directory creation
    pub fn set_create_dir_failure(&self, should_fail: bool) {
        *self.should_fail_create_dir.lock().unwrap() = should_fail;
    }
}

impl FileSystemInterface for MockFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        self.read_calls.lock().unwrap().push(path.to_path_buf());

        if *self.should_fail_read.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock read failure"));
        }

        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        self.write_calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), content.to_string()));

        if *self.should_fail_write.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock write failure"));
        }

        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        self.directory_creation_calls
            .lock()
            .unwrap()
            .push(path.to_path_buf());

        if *self.should_fail_create_dir.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock create directory failure"));
        }

        Ok(())
    }

    fn get_config_modified_time(&self, path: &Path) -> Result<std::time::SystemTime> {
        if !self.config_file_exists(path) {
            return Err(anyhow::anyhow!("File not found: {}", path.display()));
        }
        // Return a fixed time for testing
        Ok(std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000))
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}
