use std::sync::{Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

/// Timer thread invoking `tick` every `interval` until stopped.
///
/// Backs the poll-driven variants of the monitors: each tick behaves like a
/// native "something may have changed" notification and relies on the
/// monitor's dedup to stay quiet when nothing did.
pub struct Poller {
    stop: Mutex<Option<mpsc::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl Poller {
    pub fn start<F>(name: &str, interval: Duration, tick: F) -> std::io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(mpsc::RecvTimeoutError::Timeout) => tick(),
                        // Explicit stop or the owner went away
                        _ => break,
                    }
                }
                debug!("Poller stopped");
            })?;

        debug!("Started poller '{}' every {:?}", name, interval);

        Ok(Self {
            stop: Mutex::new(Some(stop)),
            handle: Mutex::new(Some(handle)),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.stop.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Stops the timer and waits for an in-flight tick to finish. Idempotent.
    pub fn stop(&self) {
        let stop = self.stop.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(stop) = stop else {
            return;
        };
        let _ = stop.send(());

        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("Poller thread panicked");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
