//! Connectivity enumeration through the platform's network CLI.
//!
//! Linux uses NetworkManager's `nmcli`; macOS uses `networksetup`. This is
//! the fallback when no push source is reachable: connection notifications
//! are emulated by a poller that fires every interval and leaves dedup to
//! the WiFi monitor.

use std::process::{Command, Output};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use super::listeners::ListenerRegistry;
use super::traits::{InterfaceConnection, ListenerId, NativeCallback, WifiSystemInterface};
use crate::dispatch::Poller;
use crate::error::NativeError;

pub struct CommandWifiSystem {
    listeners: ListenerRegistry,
    poller: Mutex<Option<Poller>>,
    poll_interval: Duration,
}

impl CommandWifiSystem {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            listeners: ListenerRegistry::new(),
            poller: Mutex::new(None),
            poll_interval,
        }
    }

    fn ensure_poller(&self) -> Result<(), NativeError> {
        let mut poller = self.poller.lock().unwrap_or_else(|e| e.into_inner());
        if poller.is_none() {
            let listeners = self.listeners.clone();
            *poller = Some(Poller::start(
                "wifi-poller",
                self.poll_interval,
                move || {
                    listeners.fire_all();
                },
            )?);
        }
        Ok(())
    }
}

impl WifiSystemInterface for CommandWifiSystem {
    fn enumerate_interfaces(&self) -> Result<Vec<InterfaceConnection>, NativeError> {
        platform::enumerate()
    }

    fn add_connection_listener(&self, callback: NativeCallback) -> Result<ListenerId, NativeError> {
        let id = self.listeners.add((), callback);
        if let Err(e) = self.ensure_poller() {
            self.listeners.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
        if self.listeners.is_empty() {
            let poller = self
                .poller
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(poller) = poller {
                poller.stop();
            }
        }
    }
}

impl Drop for CommandWifiSystem {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.lock().unwrap_or_else(|e| e.into_inner()).take() {
            poller.stop();
        }
    }
}

fn run(program: &str, args: &[&str]) -> Result<String, NativeError> {
    debug!("Running {} {}", program, args.join(" "));
    let output = Command::new(program).args(args).output()?;
    check_output(program, output)
}

fn check_output(program: &str, output: Output) -> Result<String, NativeError> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if is_permission_failure(&stdout) || is_permission_failure(&stderr) {
        warn!("{} was refused by the platform: {}", program, stderr.trim());
        return Err(NativeError::PermissionDenied);
    }
    if !output.status.success() {
        return Err(NativeError::failed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }
    Ok(stdout)
}

pub(crate) fn is_permission_failure(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("not authorized")
        || text.contains("permission denied")
        || text.contains("insufficient privileges")
}

/// Splits one line of `nmcli -t` output on unescaped colons.
#[cfg(any(test, not(target_os = "macos")))]
pub(crate) fn split_terse_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Parses `nmcli -t -f DEVICE,TYPE,STATE,CONNECTION device status`.
#[cfg(any(test, not(target_os = "macos")))]
pub(crate) fn parse_nmcli_device_status(output: &str) -> Vec<InterfaceConnection> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields = split_terse_fields(line);
            if fields.len() < 4 || fields[1] != "wifi" {
                return None;
            }
            let is_connected = fields[2] == "connected";
            Some(InterfaceConnection {
                interface_id: fields[0].clone(),
                is_connected,
                profile_name: if is_connected {
                    fields[3].clone()
                } else {
                    String::new()
                },
            })
        })
        .collect()
}

/// Device names of Wi-Fi ports in `networksetup -listallhardwareports`.
#[cfg(any(test, target_os = "macos"))]
pub(crate) fn parse_hardware_ports(output: &str) -> Vec<String> {
    let mut devices = Vec::new();
    let mut in_wifi_port = false;
    for line in output.lines().map(str::trim) {
        if let Some(port) = line.strip_prefix("Hardware Port:") {
            let port = port.trim();
            in_wifi_port = port == "Wi-Fi" || port == "AirPort";
        } else if let Some(device) = line.strip_prefix("Device:") {
            if in_wifi_port {
                devices.push(device.trim().to_string());
            }
            in_wifi_port = false;
        }
    }
    devices
}

/// Network name from `networksetup -getairportnetwork <device>`.
#[cfg(any(test, target_os = "macos"))]
pub(crate) fn parse_airport_network(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (_, name) = line.split_once("Network:")?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use super::*;

    pub fn enumerate() -> Result<Vec<InterfaceConnection>, NativeError> {
        let output = run(
            "nmcli",
            &["-t", "-f", "DEVICE,TYPE,STATE,CONNECTION", "device", "status"],
        )?;
        Ok(parse_nmcli_device_status(&output))
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::*;

    pub fn enumerate() -> Result<Vec<InterfaceConnection>, NativeError> {
        let ports = run("networksetup", &["-listallhardwareports"])?;
        parse_hardware_ports(&ports)
            .into_iter()
            .map(|device| {
                let output = run("networksetup", &["-getairportnetwork", &device])?;
                Ok(match parse_airport_network(&output) {
                    Some(name) => InterfaceConnection::connected(device, name),
                    None => InterfaceConnection::disconnected(device),
                })
            })
            .collect()
    }
}
