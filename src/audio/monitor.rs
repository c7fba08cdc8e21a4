use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchBridge, DispatchMode, Poller};
use crate::error::{ErrorKind, NativeError};
use crate::model::{Subscribers, Subscription};
use crate::state::{AudioDeviceState, has_changed};
use crate::system::{AudioSystemInterface, ListenerId, PlaybackDevice};

/// Period of the "did anything change" check used when the platform cannot
/// push notifications.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How the monitor learns about changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Native default-device and volume listeners.
    Notify,
    /// Periodic re-read on a timer thread.
    Poll(Duration),
}

/// Tracks the default playback device and publishes de-duplicated
/// [`AudioDeviceState`] snapshots.
///
/// Notify and poll modes share one pipeline: every trigger reconciles the
/// bound device against the system default, re-reads, and publishes only
/// genuine changes. A device identity change is always published.
pub struct AudioMonitor<A: AudioSystemInterface> {
    inner: Arc<AudioInner<A>>,
}

struct DeviceBinding {
    device: Option<PlaybackDevice>,
    volume_listener: Option<ListenerId>,
}

struct AudioInner<A: AudioSystemInterface> {
    system: A,
    bridge: DispatchBridge,
    weak_self: Weak<AudioInner<A>>,
    /// Guards every read and write against the native device handle.
    device: Mutex<DeviceBinding>,
    last: Mutex<Option<AudioDeviceState>>,
    subscribers: Subscribers<AudioDeviceState>,
    use_notifications: AtomicBool,
    default_listener: Mutex<Option<ListenerId>>,
    poller: Mutex<Option<Poller>>,
    disposed: AtomicBool,
}

impl<A: AudioSystemInterface> AudioMonitor<A> {
    /// Notification-driven monitor, falling back to polling when the
    /// platform cannot push changes.
    pub fn new(system: A, bridge: DispatchBridge) -> Self {
        Self::with_mode(system, bridge, MonitorMode::Notify)
    }

    pub fn with_mode(system: A, bridge: DispatchBridge, mode: MonitorMode) -> Self {
        let use_notifications =
            mode == MonitorMode::Notify && system.supports_change_notifications();

        let inner = Arc::new_cyclic(|weak_self| AudioInner {
            system,
            bridge,
            weak_self: weak_self.clone(),
            device: Mutex::new(DeviceBinding {
                device: None,
                volume_listener: None,
            }),
            last: Mutex::new(None),
            subscribers: Subscribers::new(),
            use_notifications: AtomicBool::new(use_notifications),
            default_listener: Mutex::new(None),
            poller: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let monitor = Self { inner };
        monitor.inner.bind_initial();

        let poll_interval = match mode {
            MonitorMode::Poll(interval) => Some(interval),
            MonitorMode::Notify if !use_notifications => {
                info!("Audio system has no change notifications, polling instead");
                Some(DEFAULT_POLL_INTERVAL)
            }
            MonitorMode::Notify => match monitor.inner.arm_default_listener() {
                Ok(()) => None,
                Err(e) => {
                    warn!("Failed to subscribe to default device changes: {}", e);
                    monitor.inner.use_notifications.store(false, Ordering::SeqCst);
                    Some(DEFAULT_POLL_INTERVAL)
                }
            },
        };

        if let Some(interval) = poll_interval {
            if let Err(e) = monitor.start_polling(interval) {
                warn!("Audio monitor could not start polling: {}", e);
            }
        }

        info!(
            "Audio monitor created: {} ({} dispatch)",
            monitor.current(),
            monitor.dispatch_mode()
        );
        monitor
    }

    pub fn current(&self) -> AudioDeviceState {
        self.inner
            .last
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(AudioDeviceState::unavailable)
    }

    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AudioDeviceState) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(handler)
    }

    /// Sets the volume of the default device.
    ///
    /// Published state converges through the follow-up re-read, not through
    /// an optimistic local update.
    pub fn set_volume(&self, percent: i32) -> Result<(), ErrorKind> {
        let percent = u8::try_from(percent)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or(ErrorKind::OutOfRange)?;

        self.inner.command(|system, device| {
            debug!("Setting volume of '{}' to {}%", device.name, percent);
            system.write_volume(device, percent)
        })
    }

    /// Flips the mute state and returns the new value as confirmed by the device.
    pub fn toggle_mute(&self) -> Result<bool, ErrorKind> {
        self.inner.command(|system, device| {
            let muted = !system.read_volume(device)?.is_muted;
            system.write_mute(device, muted)?;
            Ok(system.read_volume(device)?.is_muted)
        })
    }

    pub fn set_mute(&self, muted: bool) -> Result<bool, ErrorKind> {
        self.inner.command(|system, device| {
            system.write_mute(device, muted)?;
            Ok(system.read_volume(device)?.is_muted)
        })
    }

    /// Starts (or restarts with a new interval) the periodic re-read.
    pub fn start_polling(&self, interval: Duration) -> Result<(), ErrorKind> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(ErrorKind::Unavailable);
        }
        if interval.is_zero() {
            return Err(ErrorKind::OutOfRange);
        }

        let weak = Arc::downgrade(&self.inner);
        let poller = Poller::start("audio-poller", interval, move || {
            if let Some(inner) = weak.upgrade() {
                inner.post_reconcile();
            }
        })
        .map_err(|e| {
            warn!("Failed to spawn audio poller: {}", e);
            ErrorKind::Unavailable
        })?;

        let previous = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(poller);
        if let Some(previous) = previous {
            previous.stop();
        }
        debug!("Audio polling every {:?}", interval);
        Ok(())
    }

    pub fn stop_polling(&self) {
        let poller = self
            .inner
            .poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(poller) = poller {
            poller.stop();
            debug!("Audio polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(Poller::is_running)
    }

    pub fn uses_notifications(&self) -> bool {
        self.inner.use_notifications.load(Ordering::SeqCst)
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.inner.bridge.mode()
    }

    /// Schedules a reconcile on the dispatch context.
    pub fn refresh(&self) {
        self.inner.post_reconcile();
    }

    /// Releases native listeners and stops polling. Safe to call more than once.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_polling();

        let default_listener = self
            .inner
            .default_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(id) = default_listener {
            self.inner.system.remove_listener(id);
        }

        let mut binding = self.inner.device.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = binding.volume_listener.take() {
            self.inner.system.remove_listener(id);
        }
        binding.device = None;
        debug!("Audio monitor disposed");
    }
}

impl<A: AudioSystemInterface> Drop for AudioMonitor<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<A: AudioSystemInterface> AudioInner<A> {
    /// Best-effort first read; seeds the snapshot without notifying.
    fn bind_initial(&self) {
        let mut binding = self.device.lock().unwrap_or_else(|e| e.into_inner());
        let state = match self.system.default_playback_device() {
            Ok(device) => {
                self.rebind(&mut binding, device);
                self.read_state(&binding)
            }
            Err(e) => {
                warn!("Initial audio device read failed: {}", e);
                AudioDeviceState::unavailable()
            }
        };
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(state);
    }

    fn arm_default_listener(&self) -> Result<(), NativeError> {
        let weak = self.weak_self.clone();
        let id = self.system.add_default_device_listener(Box::new(move || {
            debug!("Default playback device notification received");
            if let Some(inner) = weak.upgrade() {
                inner.post_reconcile();
            }
        }))?;
        *self
            .default_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(id);
        Ok(())
    }

    /// Moves the volume subscription to `device`. Caller holds the device lock.
    fn rebind(&self, binding: &mut DeviceBinding, device: Option<PlaybackDevice>) {
        if let Some(id) = binding.volume_listener.take() {
            self.system.remove_listener(id);
        }
        binding.device = device;

        let Some(device) = binding.device.as_ref() else {
            debug!("No default playback device bound");
            return;
        };
        debug!("Bound to playback device '{}'", device.name);
        if !self.use_notifications.load(Ordering::SeqCst) {
            return;
        }

        let weak = self.weak_self.clone();
        let device_id = device.id.clone();
        match self.system.add_volume_listener(
            device,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.post_volume_changed(device_id.clone());
                }
            }),
        ) {
            Ok(id) => binding.volume_listener = Some(id),
            Err(e) => warn!("Failed to subscribe to volume of '{}': {}", device.name, e),
        }
    }

    fn read_state(&self, binding: &DeviceBinding) -> AudioDeviceState {
        let Some(device) = binding.device.as_ref() else {
            return AudioDeviceState::unavailable();
        };
        match self.system.read_volume(device) {
            Ok(reading) => {
                AudioDeviceState::available(&device.name, reading.volume_percent, reading.is_muted)
            }
            Err(e) => {
                warn!("Failed to read volume of '{}': {}", device.name, e);
                AudioDeviceState::unavailable()
            }
        }
    }

    /// Records `state` as published when it is a genuine change (or `force`).
    fn commit(&self, state: AudioDeviceState, force: bool) -> Option<AudioDeviceState> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if force || has_changed(last.as_ref(), &state) {
            *last = Some(state.clone());
            Some(state)
        } else {
            debug!("Audio state unchanged: {}", state);
            None
        }
    }

    fn publish(&self, state: Option<AudioDeviceState>) {
        if let Some(state) = state {
            info!("Audio state changed: {}", state);
            self.subscribers.notify(&state);
        }
    }

    fn post_reconcile(&self) {
        let weak = self.weak_self.clone();
        self.bridge.post(move || {
            if let Some(inner) = weak.upgrade() {
                inner.reconcile();
            }
        });
    }

    /// Device lock, or `None` once disposed. The flag is checked with the
    /// lock held so nothing can rebind after `dispose` has cleared the binding.
    fn lock_live_device(&self) -> Option<MutexGuard<'_, DeviceBinding>> {
        let binding = self.device.lock().unwrap_or_else(|e| e.into_inner());
        if self.disposed.load(Ordering::SeqCst) {
            return None;
        }
        Some(binding)
    }

    /// Follows the system default device and re-reads it.
    fn reconcile(&self) {
        let published = {
            let Some(mut binding) = self.lock_live_device() else {
                return;
            };
            match self.system.default_playback_device() {
                Ok(default) => {
                    let bound = binding.device.as_ref().map(|d| &d.id);
                    if bound != default.as_ref().map(|d| &d.id) {
                        self.rebind(&mut binding, default);
                        let state = self.read_state(&binding);
                        self.commit(state, true)
                    } else {
                        let state = self.read_state(&binding);
                        self.commit(state, false)
                    }
                }
                Err(e) => {
                    warn!("Failed to query default playback device: {}", e);
                    self.commit(AudioDeviceState::unavailable(), false)
                }
            }
        };
        self.publish(published);
    }

    fn post_volume_changed(&self, device_id: String) {
        let weak = self.weak_self.clone();
        self.bridge.post(move || {
            if let Some(inner) = weak.upgrade() {
                inner.volume_changed(&device_id);
            }
        });
    }

    fn volume_changed(&self, device_id: &str) {
        let published = {
            let Some(binding) = self.lock_live_device() else {
                return;
            };
            if binding.device.as_ref().map(|d| d.id.as_str()) != Some(device_id) {
                debug!("Ignoring volume notification from unbound device {}", device_id);
                return;
            }
            let state = self.read_state(&binding);
            self.commit(state, false)
        };
        self.publish(published);
    }

    /// Runs `op` against the bound device under the device lock, then
    /// schedules a re-read so the published state converges.
    fn command<T>(
        &self,
        op: impl FnOnce(&A, &PlaybackDevice) -> Result<T, NativeError>,
    ) -> Result<T, ErrorKind> {
        let result = {
            let mut binding = self
                .lock_live_device()
                .ok_or(ErrorKind::DeviceUnavailable)?;
            if binding.device.is_none() {
                match self.system.default_playback_device()? {
                    Some(device) => self.rebind(&mut binding, Some(device)),
                    None => return Err(ErrorKind::DeviceUnavailable),
                }
            }
            let device = binding.device.as_ref().ok_or(ErrorKind::DeviceUnavailable)?;
            op(&self.system, device).map_err(ErrorKind::from)
        };

        match &result {
            Ok(_) => self.post_reconcile(),
            Err(kind) => warn!("Audio command failed: {}", kind),
        }
        result
    }
}
