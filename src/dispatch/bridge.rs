//! Marshaling of native callbacks onto a single consumer-visible timeline.
//!
//! Native notification sources invoke their callbacks on threads we do not
//! control. Every state mutation and subscriber fan-out goes through
//! [`DispatchBridge::post`], which either enqueues the work on the
//! configured [`Dispatcher`] (queued mode) or, when none was available at
//! construction, runs it right away on the calling thread (inline mode).

use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A unit of work posted to the dispatch context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// "Run this closure on context C" primitive supplied by the host (a UI
/// thread queue, a dedicated worker, ...).
pub trait Dispatcher: Send + Sync {
    /// Enqueue `job` without blocking. Hands the job back if the context has
    /// shut down.
    fn post(&self, job: Job) -> Result<(), Job>;

    /// Whether the calling thread is the dispatch context itself.
    fn is_current(&self) -> bool {
        false
    }
}

/// How the bridge delivers work. Callers can inspect this because inline
/// delivery runs subscribers re-entrantly on the notifying thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Work is enqueued on a dispatcher and runs later, in order.
    Queued,
    /// Work runs synchronously on the caller's thread.
    Inline,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Queued => write!(f, "queued"),
            DispatchMode::Inline => write!(f, "inline"),
        }
    }
}

#[derive(Clone)]
pub struct DispatchBridge {
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl DispatchBridge {
    /// Builds a bridge over `dispatcher`, falling back to inline delivery when
    /// none is available.
    pub fn new(dispatcher: Option<Arc<dyn Dispatcher>>) -> Self {
        let bridge = Self { dispatcher };
        debug!("Dispatch bridge created in {} mode", bridge.mode());
        bridge
    }

    pub fn queued(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self::new(Some(dispatcher))
    }

    pub fn inline() -> Self {
        Self::new(None)
    }

    pub fn mode(&self) -> DispatchMode {
        if self.dispatcher.is_some() {
            DispatchMode::Queued
        } else {
            DispatchMode::Inline
        }
    }

    /// Posts `work` to the dispatch context and returns immediately (queued
    /// mode), or runs it before returning (inline mode).
    pub fn post<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.dispatcher {
            Some(dispatcher) => {
                if dispatcher.post(Box::new(work)).is_err() {
                    debug!("Dispatch context closed, dropping posted work");
                }
            }
            None => work(),
        }
    }

    /// True when called from the dispatch context (always true inline).
    pub fn is_dispatch_context(&self) -> bool {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.is_current(),
            None => true,
        }
    }
}

impl fmt::Debug for DispatchBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchBridge")
            .field("mode", &self.mode())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Dispatcher that parks work until the test drains it.
    #[derive(Default)]
    struct ManualDispatcher {
        queue: Mutex<Vec<Job>>,
        closed: Mutex<bool>,
    }

    impl ManualDispatcher {
        fn drain(&self) -> usize {
            let jobs: Vec<Job> = self.queue.lock().unwrap().drain(..).collect();
            let count = jobs.len();
            for job in jobs {
                job();
            }
            count
        }
    }

    impl Dispatcher for ManualDispatcher {
        fn post(&self, job: Job) -> Result<(), Job> {
            if *self.closed.lock().unwrap() {
                return Err(job);
            }
            self.queue.lock().unwrap().push(job);
            Ok(())
        }
    }

    #[test]
    fn test_inline_runs_before_returning() {
        let bridge = DispatchBridge::inline();
        assert_eq!(bridge.mode(), DispatchMode::Inline);
        assert!(bridge.is_dispatch_context());

        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        bridge.post(move || *flag.lock().unwrap() = true);
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_queued_defers_and_preserves_order() {
        let dispatcher = Arc::new(ManualDispatcher::default());
        let bridge = DispatchBridge::queued(dispatcher.clone());
        assert_eq!(bridge.mode(), DispatchMode::Queued);

        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            bridge.post(move || seen.lock().unwrap().push(i));
        }
        assert!(seen.lock().unwrap().is_empty());

        assert_eq!(dispatcher.drain(), 5);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_closed_dispatcher_drops_work() {
        let dispatcher = Arc::new(ManualDispatcher::default());
        *dispatcher.closed.lock().unwrap() = true;
        let bridge = DispatchBridge::queued(dispatcher.clone());

        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        bridge.post(move || *flag.lock().unwrap() = true);
        assert_eq!(dispatcher.drain(), 0);
        assert!(!*ran.lock().unwrap());
    }
}
