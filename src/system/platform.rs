use std::time::Duration;
use tracing::info;

use super::command_wifi::CommandWifiSystem;
#[cfg(target_os = "linux")]
use super::networkmanager::NetworkManagerWifiSystem;
use super::traits::{InterfaceConnection, ListenerId, NativeCallback, WifiSystemInterface};
use crate::error::NativeError;

/// Connectivity backend chosen at startup.
///
/// NetworkManager's D-Bus interface is preferred because it pushes
/// changes; the CLI poller covers hosts where the bus is unreachable.
pub enum PlatformWifiSystem {
    #[cfg(target_os = "linux")]
    NetworkManager(NetworkManagerWifiSystem),
    Command(CommandWifiSystem),
}

impl PlatformWifiSystem {
    pub fn new(poll_interval: Duration) -> Self {
        #[cfg(target_os = "linux")]
        {
            match NetworkManagerWifiSystem::connect() {
                Ok(system) => {
                    info!("Using NetworkManager D-Bus notifications for WiFi changes");
                    return Self::NetworkManager(system);
                }
                Err(e) => tracing::warn!(
                    "NetworkManager D-Bus unavailable ({}), polling nmcli every {:?}",
                    e,
                    poll_interval
                ),
            }
        }

        info!("Polling the network CLI for WiFi changes");
        Self::Command(CommandWifiSystem::new(poll_interval))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(target_os = "linux")]
            Self::NetworkManager(_) => "networkmanager-dbus",
            Self::Command(_) => "command-poll",
        }
    }
}

impl WifiSystemInterface for PlatformWifiSystem {
    fn enumerate_interfaces(&self) -> Result<Vec<InterfaceConnection>, NativeError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::NetworkManager(system) => system.enumerate_interfaces(),
            Self::Command(system) => system.enumerate_interfaces(),
        }
    }

    fn add_connection_listener(&self, callback: NativeCallback) -> Result<ListenerId, NativeError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::NetworkManager(system) => system.add_connection_listener(callback),
            Self::Command(system) => system.add_connection_listener(callback),
        }
    }

    fn remove_listener(&self, id: ListenerId) {
        match self {
            #[cfg(target_os = "linux")]
            Self::NetworkManager(system) => system.remove_listener(id),
            Self::Command(system) => system.remove_listener(id),
        }
    }
}
