use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchBridge, DispatchMode};
use crate::error::ErrorKind;
use crate::model::{Subscribers, Subscription};
use crate::state::{NetworkState, has_changed};
use crate::system::{InterfaceConnection, ListenerId, WifiSystemInterface};

/// Tracks connectivity through a [`WifiSystemInterface`] and publishes
/// de-duplicated [`NetworkState`] snapshots.
///
/// Every native notification is treated as "something changed": the
/// monitor re-enumerates on the dispatch context, picks the first connected
/// interface and publishes only genuine transitions.
pub struct WifiMonitor<W: WifiSystemInterface> {
    inner: Arc<WifiInner<W>>,
}

struct WifiInner<W: WifiSystemInterface> {
    system: W,
    bridge: DispatchBridge,
    last: Mutex<Option<NetworkState>>,
    subscribers: Subscribers<NetworkState>,
    listener: Mutex<Option<ListenerId>>,
    disposed: AtomicBool,
}

impl<W: WifiSystemInterface> WifiMonitor<W> {
    pub fn new(system: W, bridge: DispatchBridge) -> Self {
        Self {
            inner: Arc::new(WifiInner {
                system,
                bridge,
                last: Mutex::new(None),
                subscribers: Subscribers::new(),
                listener: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Arms the native listener and performs the first status read.
    ///
    /// The read happens synchronously so permission problems surface here;
    /// the resulting snapshot is published through the dispatch bridge. On
    /// failure a degraded state is published and the monitor stays unarmed.
    pub fn initialize(&self) -> Result<(), ErrorKind> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(ErrorKind::Unavailable);
        }

        let mut listener = self.inner.listener.lock().unwrap_or_else(|e| e.into_inner());
        if listener.is_none() {
            let weak = Arc::downgrade(&self.inner);
            let bridge = self.inner.bridge.clone();
            let id = self
                .inner
                .system
                .add_connection_listener(Box::new(move || {
                    debug!("Connectivity notification received");
                    let weak: Weak<WifiInner<W>> = weak.clone();
                    bridge.post(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.refresh();
                        }
                    });
                }))
                .map_err(|e| {
                    let kind = ErrorKind::from(e);
                    warn!("Failed to subscribe to connectivity changes: {}", kind);
                    self.publish_degraded(kind);
                    kind
                })?;
            *listener = Some(id);
        }

        match self.inner.read() {
            Ok(state) => {
                drop(listener);
                self.publish(state);
                info!("WiFi monitor armed ({} dispatch)", self.dispatch_mode());
                Ok(())
            }
            Err(kind) => {
                warn!("Initial connectivity read failed: {}", kind);
                if let Some(id) = listener.take() {
                    self.inner.system.remove_listener(id);
                }
                drop(listener);
                self.publish_degraded(kind);
                Err(kind)
            }
        }
    }

    /// Last published snapshot; disconnected before the first read.
    pub fn current(&self) -> NetworkState {
        self.inner
            .last
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_default()
    }

    /// Registers `handler` for genuine transitions. Delivery stops when the
    /// returned [`Subscription`] is dropped.
    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&NetworkState) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(handler)
    }

    /// Schedules a re-enumeration on the dispatch context.
    pub fn refresh(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.bridge.post(move || {
            if let Some(inner) = weak.upgrade() {
                inner.refresh();
            }
        });
    }

    pub fn is_armed(&self) -> bool {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.inner.bridge.mode()
    }

    /// Unregisters from the native source. Safe to call more than once.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let listener = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(id) = listener {
            self.inner.system.remove_listener(id);
        }
        debug!("WiFi monitor disposed");
    }

    fn publish_degraded(&self, kind: ErrorKind) {
        self.publish(NetworkState::degraded(kind));
    }

    /// Hands an already-read snapshot to the dispatch context.
    fn publish(&self, state: NetworkState) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.bridge.post(move || {
            if let Some(inner) = weak.upgrade() {
                inner.apply(state);
            }
        });
    }
}

impl<W: WifiSystemInterface> Drop for WifiMonitor<W> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<W: WifiSystemInterface> WifiInner<W> {
    fn read(&self) -> Result<NetworkState, ErrorKind> {
        let interfaces = self.system.enumerate_interfaces()?;
        Ok(first_connected(&interfaces))
    }

    /// Re-reads and publishes on a genuine transition. Runtime failures
    /// degrade to a disconnected state carrying the error.
    fn refresh(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let state = self.read().unwrap_or_else(|kind| {
            warn!("Connectivity read failed, reporting disconnected: {}", kind);
            NetworkState::degraded(kind)
        });
        self.apply(state);
    }

    fn apply(&self, state: NetworkState) {
        {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            // A read recovering from (or falling into) a failure is a transition
            // even when connectivity itself looks the same
            let error_changed = last.as_ref().is_some_and(|last| last.error != state.error);
            if !has_changed(last.as_ref(), &state) && !error_changed {
                debug!("Connectivity unchanged: {}", state);
                return;
            }
            *last = Some(state.clone());
        }
        info!("Network state changed: {}", state);
        self.subscribers.notify(&state);
    }
}

/// First interface reporting an active connection, in enumeration order.
fn first_connected(interfaces: &[InterfaceConnection]) -> NetworkState {
    interfaces
        .iter()
        .find(|interface| interface.is_connected)
        .map(|interface| NetworkState::connected(interface.profile_name.clone()))
        .unwrap_or_else(NetworkState::disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::WorkerDispatcher;
    use crate::error::NativeError;
    use crate::system::mocks::MockWifiSystem;

    fn recorder(monitor: &WifiMonitor<MockWifiSystem>) -> (Arc<Mutex<Vec<NetworkState>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = monitor.on_change(move |state| sink.lock().unwrap().push(state.clone()));
        (seen, subscription)
    }

    #[test]
    fn test_first_match_wins_over_later_interfaces() {
        let interfaces = vec![
            InterfaceConnection::disconnected("wlan0"),
            InterfaceConnection::connected("wlan1", "office"),
            InterfaceConnection::connected("wlan2", "home-5g"),
        ];
        assert_eq!(first_connected(&interfaces), NetworkState::connected("office"));
        assert_eq!(first_connected(&[]), NetworkState::disconnected());
    }

    #[test]
    fn test_initialize_publishes_first_read() {
        let system = MockWifiSystem::connected_to("home-5g");
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::inline());
        let (seen, _subscription) = recorder(&monitor);

        assert_eq!(monitor.initialize(), Ok(()));
        assert!(monitor.is_armed());
        assert_eq!(system.listener_count(), 1);
        assert_eq!(monitor.current(), NetworkState::connected("home-5g"));
        assert_eq!(*seen.lock().unwrap(), vec![NetworkState::connected("home-5g")]);
    }

    #[test]
    fn test_identical_notifications_publish_once() {
        let system = MockWifiSystem::connected_to("home-5g");
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::inline());
        monitor.initialize().unwrap();
        let (seen, _subscription) = recorder(&monitor);

        system.join("coffeeshop");
        system.trigger_connection_change();
        system.trigger_connection_change();

        assert_eq!(*seen.lock().unwrap(), vec![NetworkState::connected("coffeeshop")]);
    }

    #[test]
    fn test_permission_denied_on_initialize() {
        let system = MockWifiSystem::connected_to("home-5g");
        system.set_enumeration_failure(Some(NativeError::PermissionDenied));
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::inline());

        assert_eq!(monitor.initialize(), Err(ErrorKind::PermissionDenied));
        assert!(!monitor.is_armed());
        assert_eq!(system.listener_count(), 0);

        let current = monitor.current();
        assert!(!current.connected);
        assert_eq!(current.error, Some(ErrorKind::PermissionDenied));
    }

    #[test]
    fn test_other_native_failure_is_unavailable() {
        let system = MockWifiSystem::new();
        system.set_listener_failure(Some(NativeError::failed("no daemon")));
        let monitor = WifiMonitor::new(system, DispatchBridge::inline());

        assert_eq!(monitor.initialize(), Err(ErrorKind::Unavailable));
    }

    #[test]
    fn test_runtime_permission_failure_degrades_and_keeps_listening() {
        let system = MockWifiSystem::connected_to("home-5g");
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::inline());
        monitor.initialize().unwrap();
        let (seen, _subscription) = recorder(&monitor);

        system.set_enumeration_failure(Some(NativeError::PermissionDenied));
        system.trigger_connection_change();
        system.set_enumeration_failure(None);
        system.trigger_connection_change();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                NetworkState::degraded(ErrorKind::PermissionDenied),
                NetworkState::connected("home-5g"),
            ]
        );
        assert!(monitor.is_armed());
    }

    #[test]
    fn test_permission_recovery_while_disconnected_clears_error() {
        let system = MockWifiSystem::connected_to("home");
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::inline());
        monitor.initialize().unwrap();
        let (seen, _subscription) = recorder(&monitor);

        system.set_enumeration_failure(Some(NativeError::PermissionDenied));
        system.trigger_connection_change();
        system.set_enumeration_failure(None);
        system.leave();

        assert_eq!(monitor.current(), NetworkState::disconnected());
        assert_eq!(monitor.current().error, None);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                NetworkState::degraded(ErrorKind::PermissionDenied),
                NetworkState::disconnected(),
            ]
        );

        // Falling back into a failure from a clean disconnect is reported too
        system.set_enumeration_failure(Some(NativeError::PermissionDenied));
        system.trigger_connection_change();
        assert_eq!(monitor.current().error, Some(ErrorKind::PermissionDenied));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_initialize_publishes_the_snapshot_it_read() {
        let system = MockWifiSystem::connected_to("home-5g");
        let worker = WorkerDispatcher::spawn("wifi-init-test").unwrap();
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::queued(worker.clone()));
        let (seen, _subscription) = recorder(&monitor);

        monitor.initialize().unwrap();
        // Connectivity moves before the dispatch context runs
        system.set_interfaces(vec![InterfaceConnection::connected("wlan0", "office")]);
        worker.flush();

        assert_eq!(system.enumerate_call_count(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![NetworkState::connected("home-5g")]);
        worker.shutdown();
    }

    #[test]
    fn test_dispose_twice_is_noop() {
        let system = MockWifiSystem::connected_to("home-5g");
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::inline());
        monitor.initialize().unwrap();
        let (seen, _subscription) = recorder(&monitor);

        monitor.dispose();
        monitor.dispose();
        assert_eq!(system.listener_count(), 0);

        system.join("coffeeshop");
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(monitor.initialize(), Err(ErrorKind::Unavailable));
    }

    #[test]
    fn test_drop_releases_listener() {
        let system = MockWifiSystem::connected_to("home-5g");
        {
            let monitor = WifiMonitor::new(system.clone(), DispatchBridge::inline());
            monitor.initialize().unwrap();
            assert_eq!(system.listener_count(), 1);
        }
        assert_eq!(system.listener_count(), 0);
    }

    #[test]
    fn test_worker_dispatch_preserves_notification_order() {
        let worker = WorkerDispatcher::spawn("wifi-test").unwrap();
        let system = MockWifiSystem::connected_to("a");
        let monitor = WifiMonitor::new(system.clone(), DispatchBridge::queued(worker.clone()));
        assert_eq!(monitor.dispatch_mode(), DispatchMode::Queued);
        let (seen, _subscription) = recorder(&monitor);

        monitor.initialize().unwrap();
        worker.flush();
        for ssid in ["b", "c", "d"] {
            system.join(ssid);
            worker.flush();
        }

        let ssids: Vec<String> = seen.lock().unwrap().iter().map(|s| s.ssid.clone()).collect();
        assert_eq!(ssids, vec!["a", "b", "c", "d"]);
        worker.shutdown();
    }
}
