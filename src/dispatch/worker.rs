use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tracing::{debug, error, info};

use super::bridge::{Dispatcher, Job};

/// Single dedicated thread draining posted work in FIFO order.
///
/// Used as the dispatch context when the host has no UI thread of its own
/// (daemon and CLI modes).
pub struct WorkerDispatcher {
    sender: Mutex<Option<UnboundedSender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl WorkerDispatcher {
    pub fn spawn(name: &str) -> std::io::Result<Arc<Self>> {
        let (sender, mut receiver) = unbounded_channel::<Job>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!("Dispatch worker started");
                while let Some(job) = receiver.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("Dispatched job panicked, worker continues");
                    }
                }
                debug!("Dispatch worker stopped");
            })?;

        info!("Spawned dispatch worker '{}'", name);

        Ok(Arc::new(Self {
            thread_id: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        }))
    }

    /// Blocks until every job posted before this call has run.
    ///
    /// Returns immediately when called from the worker itself or after
    /// shutdown.
    pub fn flush(&self) {
        if self.is_current() {
            return;
        }
        let (ack, done) = mpsc::channel();
        let posted = self.post(Box::new(move || {
            let _ = ack.send(());
        }));
        if posted.is_ok() {
            let _ = done.recv();
        }
    }

    /// Stops accepting work, lets queued jobs finish and joins the thread.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        if self.is_current() {
            // Joining ourselves would deadlock; the loop ends once the queue drains
            return;
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Dispatch worker thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl Dispatcher for WorkerDispatcher {
    fn post(&self, job: Job) -> Result<(), Job> {
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(sender) => sender.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for WorkerDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchBridge;

    #[test]
    fn test_jobs_run_on_worker_in_order() {
        let worker = WorkerDispatcher::spawn("test-dispatch").unwrap();
        let bridge = DispatchBridge::queued(worker.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let caller = thread::current().id();
        for i in 0..100 {
            let seen = seen.clone();
            bridge.post(move || {
                assert_ne!(thread::current().id(), caller);
                seen.lock().unwrap().push(i);
            });
        }
        worker.flush();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_post_after_shutdown_is_rejected() {
        let worker = WorkerDispatcher::spawn("test-dispatch").unwrap();
        worker.shutdown();
        assert!(!worker.is_running());
        assert!(worker.post(Box::new(|| {})).is_err());

        // Second shutdown is a no-op
        worker.shutdown();
        worker.flush();
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let worker = WorkerDispatcher::spawn("test-dispatch").unwrap();
        let _ = worker.post(Box::new(|| panic!("boom")));

        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let _ = worker.post(Box::new(move || *flag.lock().unwrap() = true));
        worker.flush();
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_is_current_only_on_worker() {
        let worker = WorkerDispatcher::spawn("test-dispatch").unwrap();
        assert!(!worker.is_current());

        let inside = Arc::new(Mutex::new(false));
        let flag = inside.clone();
        let observer = worker.clone();
        let _ = worker.post(Box::new(move || {
            *flag.lock().unwrap() = observer.is_current();
        }));
        worker.flush();
        assert!(*inside.lock().unwrap());
    }
}
