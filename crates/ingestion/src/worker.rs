//! Named background threads with a bounded join
//!
//! Capture loops and the online adapter loop run on plain OS threads. The
//! handle can be joined with a timeout; a worker that misses the bound is
//! detached and finishes its current iteration on its own.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use contracts::ContractError;
use tracing::{debug, warn};

/// Current wall clock in milliseconds since the Unix epoch
pub fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Signals completion when dropped, including during a panic unwind
struct DoneSignal(mpsc::Sender<()>);

impl Drop for DoneSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Handle to a named worker thread
pub struct WorkerHandle {
    name: String,
    handle: Option<JoinHandle<()>>,
    done_rx: mpsc::Receiver<()>,
}

impl WorkerHandle {
    /// Spawn `body` on a new thread called `name`
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self, ContractError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let (done_tx, done_rx) = mpsc::channel();

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let _done = DoneSignal(done_tx);
            body();
        })?;

        debug!(worker = %name, "Worker thread started");
        Ok(Self {
            name,
            handle: Some(handle),
            done_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait up to `timeout` for the worker to exit.
    ///
    /// # Errors
    /// `ShutdownTimeout` when the bound elapses; the thread is detached.
    pub fn join_timeout(mut self, timeout: Duration) -> Result<(), ContractError> {
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        warn!(worker = %self.name, "Worker thread panicked");
                    }
                }
                debug!(worker = %self.name, "Worker thread joined");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                let err = ContractError::ShutdownTimeout {
                    worker: self.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                warn!(worker = %self.name, error = %err, "Detaching worker thread");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_join_finished_worker() {
        let worker = WorkerHandle::spawn("quick", || {}).unwrap();
        assert_eq!(worker.name(), "quick");
        assert!(worker.join_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_join_timeout_detaches_slow_worker() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = release.clone();
        let worker = WorkerHandle::spawn("slow", move || {
            while !flag.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        let err = worker.join_timeout(Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, ContractError::ShutdownTimeout { timeout_ms: 30, .. }));
        release.store(true, Ordering::Relaxed);
    }

    #[test]
    fn test_panicking_worker_still_joins() {
        let worker = WorkerHandle::spawn("panics", || panic!("boom")).unwrap();
        assert!(worker.join_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_wall_clock_is_after_2020() {
        assert!(wall_clock_ms() > 1_577_836_800_000);
    }
}
