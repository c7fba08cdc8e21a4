use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::traits::{ListenerId, NativeCallback};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

type SharedCallback = Arc<dyn Fn() + Send + Sync>;

/// Bookkeeping for adapters that raise notifications themselves.
///
/// Each entry carries a key so one registry can hold several kinds of
/// listener (for example "default device" and "volume of device X").
/// Callbacks are invoked outside the registry lock.
pub struct ListenerRegistry<K = ()> {
    entries: Arc<Mutex<BTreeMap<ListenerId, (K, SharedCallback)>>>,
}

impl<K: Clone + Send + 'static> ListenerRegistry<K> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn add(&self, key: K, callback: NativeCallback) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, (key, Arc::from(callback)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    /// Invokes every listener whose key satisfies `filter`, in registration order.
    pub fn fire_matching(&self, filter: impl Fn(&K) -> bool) -> usize {
        let callbacks: Vec<SharedCallback> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|(key, _)| filter(key))
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    pub fn fire_all(&self) -> usize {
        self.fire_matching(|_| true)
    }

    pub fn count_matching(&self, filter: impl Fn(&K) -> bool) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|(key, _)| filter(key))
            .count()
    }

    pub fn len(&self) -> usize {
        self.count_matching(|_| true)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Clone + Send + 'static> Default for ListenerRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for ListenerRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}
