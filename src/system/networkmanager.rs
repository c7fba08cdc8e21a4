//! Connectivity from NetworkManager over the system D-Bus.
//!
//! Enumeration walks NetworkManager's device list with blocking proxies.
//! Change notifications come from `PropertiesChanged` on the primary and
//! active connections, watched by one thread for as long as any listener is
//! registered.

use std::sync::Mutex;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use zbus::proxy;
use zbus::zvariant::OwnedObjectPath;

use super::listeners::ListenerRegistry;
use super::traits::{InterfaceConnection, ListenerId, NativeCallback, WifiSystemInterface};
use crate::error::NativeError;

/// `NM_DEVICE_TYPE_WIFI`
const DEVICE_TYPE_WIFI: u32 = 2;
/// `NM_DEVICE_STATE_ACTIVATED`
const DEVICE_STATE_ACTIVATED: u32 = 100;

#[proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager"
)]
trait NetworkManager {
    fn get_devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    #[zbus(property)]
    fn primary_connection(&self) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn active_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager"
)]
trait Device {
    #[zbus(property, name = "Interface")]
    fn interface_name(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn device_type(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn state(&self) -> zbus::Result<u32>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wireless",
    default_service = "org.freedesktop.NetworkManager"
)]
trait WirelessDevice {
    #[zbus(property)]
    fn active_access_point(&self) -> zbus::Result<OwnedObjectPath>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.AccessPoint",
    default_service = "org.freedesktop.NetworkManager"
)]
trait AccessPoint {
    #[zbus(property)]
    fn ssid(&self) -> zbus::Result<Vec<u8>>;
}

struct Watcher {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Watcher {
    fn stop(self) {
        let _ = self.stop.send(());
        // Released from inside an inline callback; the loop exits on its own
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            warn!("NetworkManager watcher thread panicked");
        }
    }
}

pub struct NetworkManagerWifiSystem {
    connection: zbus::blocking::Connection,
    listeners: ListenerRegistry,
    watcher: Mutex<Option<Watcher>>,
}

impl NetworkManagerWifiSystem {
    /// Connects to the system bus and checks NetworkManager answers.
    pub fn connect() -> Result<Self, NativeError> {
        let connection = zbus::blocking::Connection::system().map_err(map_error)?;
        let manager = NetworkManagerProxyBlocking::new(&connection).map_err(map_error)?;
        manager.get_devices().map_err(map_error)?;
        debug!("Connected to NetworkManager on the system bus");
        Ok(Self {
            connection,
            listeners: ListenerRegistry::new(),
            watcher: Mutex::new(None),
        })
    }

    fn read_interface(&self, path: &OwnedObjectPath) -> zbus::Result<Option<InterfaceConnection>> {
        let device = DeviceProxyBlocking::builder(&self.connection)
            .path(path)?
            .build()?;
        if device.device_type()? != DEVICE_TYPE_WIFI {
            return Ok(None);
        }
        let name = device.interface_name()?;
        let state = device.state()?;
        let ssid = if state == DEVICE_STATE_ACTIVATED {
            self.active_ssid(path)?
        } else {
            None
        };
        Ok(Some(interface_row(name, state, ssid)))
    }

    fn active_ssid(&self, device_path: &OwnedObjectPath) -> zbus::Result<Option<Vec<u8>>> {
        let wireless = WirelessDeviceProxyBlocking::builder(&self.connection)
            .path(device_path)?
            .build()?;
        let access_point = wireless.active_access_point()?;
        if access_point.as_str() == "/" {
            return Ok(None);
        }
        let access_point = AccessPointProxyBlocking::builder(&self.connection)
            .path(&access_point)?
            .build()?;
        Ok(Some(access_point.ssid()?))
    }

    fn ensure_watcher(&self) -> Result<(), NativeError> {
        let mut watcher = self.watcher.lock().unwrap_or_else(|e| e.into_inner());
        if watcher.is_none() {
            *watcher = Some(spawn_watcher(self.listeners.clone())?);
        }
        Ok(())
    }
}

impl WifiSystemInterface for NetworkManagerWifiSystem {
    fn enumerate_interfaces(&self) -> Result<Vec<InterfaceConnection>, NativeError> {
        let manager = NetworkManagerProxyBlocking::new(&self.connection).map_err(map_error)?;
        let mut interfaces = Vec::new();
        for path in manager.get_devices().map_err(map_error)? {
            if let Some(row) = self.read_interface(&path).map_err(map_error)? {
                interfaces.push(row);
            }
        }
        Ok(interfaces)
    }

    fn add_connection_listener(&self, callback: NativeCallback) -> Result<ListenerId, NativeError> {
        let id = self.listeners.add((), callback);
        if let Err(e) = self.ensure_watcher() {
            self.listeners.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
        if self.listeners.is_empty() {
            let watcher = self
                .watcher
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(watcher) = watcher {
                watcher.stop();
            }
        }
    }
}

impl Drop for NetworkManagerWifiSystem {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take() {
            watcher.stop();
        }
    }
}

/// Starts the signal thread and waits until both property streams are live,
/// so a failure to subscribe is reported to the caller.
fn spawn_watcher(listeners: ListenerRegistry) -> Result<Watcher, NativeError> {
    let (stop, stop_rx) = oneshot::channel();
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("nm-watcher".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(NativeError::from(e)));
                    return;
                }
            };
            runtime.block_on(watch(listeners, ready_tx, stop_rx));
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(Watcher { stop, handle }),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => Err(NativeError::failed("NetworkManager watcher exited early")),
    }
}

async fn watch(
    listeners: ListenerRegistry,
    ready: mpsc::Sender<Result<(), NativeError>>,
    mut stop: oneshot::Receiver<()>,
) {
    let connection = match zbus::Connection::system().await {
        Ok(connection) => connection,
        Err(e) => {
            let _ = ready.send(Err(map_error(e)));
            return;
        }
    };
    let manager = match NetworkManagerProxy::new(&connection).await {
        Ok(manager) => manager,
        Err(e) => {
            let _ = ready.send(Err(map_error(e)));
            return;
        }
    };
    let mut primary = manager.receive_primary_connection_changed().await;
    let mut active = manager.receive_active_connections_changed().await;
    let _ = ready.send(Ok(()));
    info!("Watching NetworkManager for connection changes");

    loop {
        tokio::select! {
            _ = &mut stop => break,
            changed = primary.next() => match changed {
                Some(_) => { listeners.fire_all(); }
                None => break,
            },
            changed = active.next() => match changed {
                Some(_) => { listeners.fire_all(); }
                None => break,
            },
        }
    }
    debug!("NetworkManager watcher stopped");
}

/// Builds one enumeration row from a wireless device's properties.
pub(crate) fn interface_row(
    interface_id: String,
    state: u32,
    ssid: Option<Vec<u8>>,
) -> InterfaceConnection {
    match ssid {
        Some(ssid) if state == DEVICE_STATE_ACTIVATED && !ssid.is_empty() => {
            InterfaceConnection::connected(interface_id, String::from_utf8_lossy(&ssid))
        }
        _ => InterfaceConnection::disconnected(interface_id),
    }
}

/// D-Bus error names NetworkManager and polkit use for refused calls.
pub(crate) fn is_access_denied(error_name: &str) -> bool {
    error_name.ends_with(".AccessDenied")
        || error_name.ends_with(".PermissionDenied")
        || error_name.ends_with(".NotAuthorized")
}

fn map_error(error: zbus::Error) -> NativeError {
    match &error {
        zbus::Error::MethodError(name, _, _) if is_access_denied(name.as_str()) => {
            NativeError::PermissionDenied
        }
        zbus::Error::FDO(fdo) if matches!(**fdo, zbus::fdo::Error::AccessDenied(_)) => {
            NativeError::PermissionDenied
        }
        _ => NativeError::failed(format!("NetworkManager D-Bus call failed: {}", error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activated_device_reports_its_ssid() {
        let row = interface_row("wlp2s0".into(), DEVICE_STATE_ACTIVATED, Some(b"home-5g".to_vec()));
        assert_eq!(row, InterfaceConnection::connected("wlp2s0", "home-5g"));
    }

    #[test]
    fn test_device_not_yet_activated_is_disconnected() {
        // NM_DEVICE_STATE_CONFIG
        let row = interface_row("wlp2s0".into(), 50, Some(b"home-5g".to_vec()));
        assert_eq!(row, InterfaceConnection::disconnected("wlp2s0"));
    }

    #[test]
    fn test_missing_or_hidden_ssid_is_disconnected() {
        let row = interface_row("wlan0".into(), DEVICE_STATE_ACTIVATED, None);
        assert!(!row.is_connected);
        let row = interface_row("wlan0".into(), DEVICE_STATE_ACTIVATED, Some(Vec::new()));
        assert!(!row.is_connected);
    }

    #[test]
    fn test_non_utf8_ssid_is_kept_lossily() {
        let row = interface_row("wlan0".into(), DEVICE_STATE_ACTIVATED, Some(vec![b'c', 0xff, b'f']));
        assert!(row.is_connected);
        assert_eq!(row.profile_name, "c\u{fffd}f");
    }

    #[test]
    fn test_refusal_error_names() {
        assert!(is_access_denied("org.freedesktop.DBus.Error.AccessDenied"));
        assert!(is_access_denied("org.freedesktop.NetworkManager.PermissionDenied"));
        assert!(!is_access_denied("org.freedesktop.DBus.Error.ServiceUnknown"));
    }
}
