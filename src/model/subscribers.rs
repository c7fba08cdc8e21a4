use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

type Callback<T> = dyn Fn(&T) + Send + Sync;

struct Handler<T> {
    callback: Box<Callback<T>>,
}

/// Caller-held handle for a registered handler.
///
/// The registry only keeps a weak reference, so dropping (or
/// [`cancel`](Self::cancel)ing) the handle stops delivery and never keeps a
/// torn-down observer alive.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    handler: Option<Arc<dyn Any + Send + Sync>>,
}

impl Subscription {
    pub fn cancel(mut self) {
        self.handler.take();
    }

    pub fn is_active(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Weakly-held list of handlers for values of type `T`.
pub struct Subscribers<T> {
    handlers: Mutex<Vec<Weak<Handler<T>>>>,
}

impl<T: 'static> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handler = Arc::new(Handler {
            callback: Box::new(callback),
        });
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::downgrade(&handler));

        let handler: Arc<dyn Any + Send + Sync> = handler;
        Subscription {
            handler: Some(handler),
        }
    }

    /// Invokes every live handler with `value`, pruning released ones.
    ///
    /// The registry lock is not held while handlers run, so a handler may
    /// subscribe or drop subscriptions re-entrantly.
    pub fn notify(&self, value: &T) -> usize {
        let live: Vec<Arc<Handler<T>>> = {
            let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.retain(|handler| handler.strong_count() > 0);
            handlers.iter().filter_map(Weak::upgrade).collect()
        };

        for handler in &live {
            (handler.callback)(value);
        }
        live.len()
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|handler| handler.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}
