//! Test utility builders for mock systems, configurations and subscribers
//!
//! Individual helpers may not be used by all tests, so dead code warnings are suppressed.

#![allow(dead_code)]

use device_state_monitor::config::{AudioMode, Config, DispatchKind};
use device_state_monitor::system::{InterfaceConnection, MockAudioSystem, MockWifiSystem};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Builder for a MockAudioSystem with a set of devices and a default
pub struct AudioSystemBuilder {
    devices: Vec<(String, u8, bool)>,
    default: Option<String>,
    push_notifications: bool,
}

impl AudioSystemBuilder {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            default: None,
            push_notifications: true,
        }
    }

    pub fn device(mut self, name: &str, volume_percent: u8, is_muted: bool) -> Self {
        self.devices.push((name.to_string(), volume_percent, is_muted));
        self
    }

    /// Add a device and make it the default
    pub fn default_device(mut self, name: &str, volume_percent: u8, is_muted: bool) -> Self {
        self.default = Some(name.to_string());
        self.device(name, volume_percent, is_muted)
    }

    pub fn without_push_notifications(mut self) -> Self {
        self.push_notifications = false;
        self
    }

    pub fn build(self) -> MockAudioSystem {
        let system = MockAudioSystem::new();
        for (name, volume, muted) in &self.devices {
            system.add_device(name, name, *volume, *muted);
        }
        *system.default_device.lock().unwrap() = self.default;
        system.set_push_notifications(self.push_notifications);
        system
    }
}

impl Default for AudioSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a MockWifiSystem with interfaces in enumeration order
pub struct WifiSystemBuilder {
    interfaces: Vec<InterfaceConnection>,
}

impl WifiSystemBuilder {
    pub fn new() -> Self {
        Self {
            interfaces: Vec::new(),
        }
    }

    pub fn connected(mut self, interface: &str, ssid: &str) -> Self {
        self.interfaces
            .push(InterfaceConnection::connected(interface, ssid));
        self
    }

    pub fn disconnected(mut self, interface: &str) -> Self {
        self.interfaces
            .push(InterfaceConnection::disconnected(interface));
        self
    }

    pub fn build(self) -> MockWifiSystem {
        let system = MockWifiSystem::new();
        system.set_interfaces(self.interfaces);
        system
    }
}

impl Default for WifiSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for test Config instances
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn inline_dispatch(mut self) -> Self {
        self.config.general.dispatch = DispatchKind::Inline;
        self
    }

    pub fn worker_dispatch(mut self) -> Self {
        self.config.general.dispatch = DispatchKind::Worker;
        self
    }

    pub fn allowed_ssid(mut self, ssid: &str) -> Self {
        self.config.agent.allowed_ssid = ssid.to_string();
        self
    }

    pub fn agent_enabled(mut self, enabled: bool) -> Self {
        self.config.agent.enabled = enabled;
        self
    }

    pub fn audio_polling(mut self, interval_ms: u64) -> Self {
        self.config.audio.mode = AudioMode::Poll;
        self.config.audio.poll_interval_ms = interval_ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    pub fn to_toml(self) -> String {
        toml::to_string_pretty(&self.config).unwrap()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects every value delivered to a subscriber
pub struct Recorder<T> {
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A handler suitable for `on_change`/`subscribe_*`
    pub fn handler(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let seen = self.seen.clone();
        move |value: &T| seen.lock().unwrap().push(value.clone())
    }

    pub fn values(&self) -> Vec<T> {
        self.seen.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll until at least `count` values arrived or the timeout expires
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.len() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.len() >= count
    }
}

impl<T: Clone + Send + 'static> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}
