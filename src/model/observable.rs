//! Process-wide holder of the latest published state.
//!
//! The model owns the currently published `(NetworkState, AudioDeviceState)`
//! pair. Each monitor feeds exactly one half through the `bind_*` helpers;
//! everyone else (UI renderers, the policy agent) reads snapshots and
//! subscribes. Fan-out happens on whichever context the publishing monitor
//! runs on, which is the dispatch bridge's context.

use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::debug;

use super::subscribers::{Subscribers, Subscription};
use crate::audio::AudioMonitor;
use crate::state::{AudioDeviceState, NetworkState};
use crate::system::{AudioSystemInterface, WifiSystemInterface};
use crate::wifi::WifiMonitor;

/// A single published update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Network(NetworkState),
    Audio(AudioDeviceState),
}

pub struct ObservableModel {
    network: RwLock<NetworkState>,
    audio: RwLock<AudioDeviceState>,
    network_subscribers: Subscribers<NetworkState>,
    audio_subscribers: Subscribers<AudioDeviceState>,
    change_subscribers: Subscribers<StateChange>,
    sources: Mutex<Vec<Subscription>>,
}

impl ObservableModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            network: RwLock::new(NetworkState::default()),
            audio: RwLock::new(AudioDeviceState::default()),
            network_subscribers: Subscribers::new(),
            audio_subscribers: Subscribers::new(),
            change_subscribers: Subscribers::new(),
            sources: Mutex::new(Vec::new()),
        })
    }

    /// Non-blocking read of the current pair.
    pub fn snapshot(&self) -> (NetworkState, AudioDeviceState) {
        (self.network(), self.audio())
    }

    pub fn network(&self) -> NetworkState {
        self.network
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn audio(&self) -> AudioDeviceState {
        self.audio
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Receives every update from either monitor.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.change_subscribers.subscribe(handler)
    }

    pub fn subscribe_network<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&NetworkState) + Send + Sync + 'static,
    {
        self.network_subscribers.subscribe(handler)
    }

    pub fn subscribe_audio<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AudioDeviceState) + Send + Sync + 'static,
    {
        self.audio_subscribers.subscribe(handler)
    }

    /// Stores `state` and fans it out. Called by the owning WiFi monitor
    /// after it has rejected no-op updates.
    pub fn publish_network(&self, state: NetworkState) {
        debug!("Model publishing network state: {}", state);
        *self.network.write().unwrap_or_else(|e| e.into_inner()) = state.clone();
        self.network_subscribers.notify(&state);
        self.change_subscribers.notify(&StateChange::Network(state));
    }

    /// Stores `state` and fans it out. Called by the owning audio monitor.
    pub fn publish_audio(&self, state: AudioDeviceState) {
        debug!("Model publishing audio state: {}", state);
        *self.audio.write().unwrap_or_else(|e| e.into_inner()) = state.clone();
        self.audio_subscribers.notify(&state);
        self.change_subscribers.notify(&StateChange::Audio(state));
    }

    /// Makes `monitor` the owner of the network half. Its current snapshot is
    /// adopted immediately and every later transition is republished.
    pub fn bind_wifi<W: WifiSystemInterface>(self: &Arc<Self>, monitor: &WifiMonitor<W>) {
        let model = Arc::downgrade(self);
        let subscription = monitor.on_change(move |state| {
            if let Some(model) = Weak::upgrade(&model) {
                model.publish_network(state.clone());
            }
        });
        *self.network.write().unwrap_or_else(|e| e.into_inner()) = monitor.current();
        self.keep(subscription);
    }

    /// Makes `monitor` the owner of the audio half.
    pub fn bind_audio<A: AudioSystemInterface>(self: &Arc<Self>, monitor: &AudioMonitor<A>) {
        let model = Arc::downgrade(self);
        let subscription = monitor.on_change(move |state| {
            if let Some(model) = Weak::upgrade(&model) {
                model.publish_audio(state.clone());
            }
        });
        *self.audio.write().unwrap_or_else(|e| e.into_inner()) = monitor.current();
        self.keep(subscription);
    }

    /// Drops the links to every bound monitor.
    pub fn unbind_all(&self) {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn keep(&self, subscription: Subscription) {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(subscription);
    }
}
