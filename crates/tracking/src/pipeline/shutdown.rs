//! Cooperative shutdown: a monotonic stop flag shared by every worker plus a
//! per-worker exit acknowledgment.
//!
//! Workers poll [`ShutdownSignal::is_stop_requested`] at the top of their
//! loops and call [`ShutdownSignal::signal_exit_ready`] right before they
//! return. The orchestrator uses [`Shutdown::wait_for_exit`] to tell whether
//! every registered worker acknowledged before joining their threads.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info};

/// Sleep interval used by [`Shutdown::wait_for_exit`] between checks.
pub const EXIT_POLL_INTERVAL_MS: u64 = 10;

/// What a worker loop needs from the coordinator.
pub trait ShutdownSignal {
    /// Non-blocking; once true, stays true.
    fn is_stop_requested(&self) -> bool;
    /// Acknowledge that this worker is about to terminate. Idempotent.
    fn signal_exit_ready(&self);
}

impl<T: ShutdownSignal + ?Sized> ShutdownSignal for &T {
    fn is_stop_requested(&self) -> bool {
        (**self).is_stop_requested()
    }

    fn signal_exit_ready(&self) {
        (**self).signal_exit_ready()
    }
}

struct WorkerSlot {
    name: String,
    exited: AtomicBool,
}

struct Inner {
    stop: AtomicBool,
    exited: AtomicUsize,
    workers: Mutex<Vec<Arc<WorkerSlot>>>,
}

/// Process-wide shutdown coordinator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stop: AtomicBool::new(false),
                exited: AtomicUsize::new(0),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a worker that will acknowledge its exit through the returned
    /// handle.
    pub fn register(&self, name: impl Into<String>) -> WorkerHandle {
        let slot = Arc::new(WorkerSlot {
            name: name.into(),
            exited: AtomicBool::new(false),
        });
        self.workers().push(slot.clone());
        WorkerHandle {
            inner: self.inner.clone(),
            slot,
        }
    }

    /// Raise the stop flag. The flag never goes back to false.
    pub fn request_stop(&self) {
        if !self.inner.stop.swap(true, Ordering::SeqCst) {
            info!("Stop requested");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// Number of workers registered so far.
    pub fn registered(&self) -> usize {
        self.workers().len()
    }

    /// Number of workers that acknowledged their exit.
    pub fn exited(&self) -> usize {
        self.inner.exited.load(Ordering::SeqCst)
    }

    pub fn all_exited(&self) -> bool {
        self.exited() >= self.registered()
    }

    /// Names of workers that have not acknowledged yet.
    pub fn pending_workers(&self) -> Vec<String> {
        self.workers()
            .iter()
            .filter(|slot| !slot.exited.load(Ordering::SeqCst))
            .map(|slot| slot.name.clone())
            .collect()
    }

    /// Poll until every registered worker acknowledged or `timeout` elapses.
    /// Returns whether all workers exited. Meant for the orchestrator only.
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.all_exited() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(EXIT_POLL_INTERVAL_MS));
        }
    }

    // The list is append-only, so a panic while holding the lock cannot leave
    // it half-updated.
    fn workers(&self) -> MutexGuard<'_, Vec<Arc<WorkerSlot>>> {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ShutdownSignal for Shutdown {
    fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// The orchestrator is not a registered worker.
    fn signal_exit_ready(&self) {}
}

/// Per-worker view of the coordinator.
pub struct WorkerHandle {
    inner: Arc<Inner>,
    slot: Arc<WorkerSlot>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Let a worker raise the stop flag for everybody, e.g. after a fatal
    /// error the rest of the rig cannot recover from.
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
    }

    pub fn has_exited(&self) -> bool {
        self.slot.exited.load(Ordering::SeqCst)
    }
}

impl ShutdownSignal for WorkerHandle {
    fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    fn signal_exit_ready(&self) {
        if !self.slot.exited.swap(true, Ordering::SeqCst) {
            self.inner.exited.fetch_add(1, Ordering::SeqCst);
            debug!("{} ready to exit", self.slot.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn exit_ready_is_idempotent() {
        let shutdown = Shutdown::new();
        let capture = shutdown.register("capture");
        let inference = shutdown.register("inference");

        capture.signal_exit_ready();
        capture.signal_exit_ready();
        assert_eq!(shutdown.exited(), 1);
        assert_eq!(shutdown.pending_workers(), vec!["inference".to_string()]);
        assert!(!shutdown.all_exited());

        inference.signal_exit_ready();
        assert!(shutdown.all_exited());
        assert!(shutdown.wait_for_exit(Duration::ZERO));
    }

    #[test]
    fn wait_for_exit_times_out_on_silent_worker() {
        let shutdown = Shutdown::new();
        let _silent = shutdown.register("stepper-x");
        assert!(!shutdown.wait_for_exit(Duration::from_millis(30)));
    }

    #[test]
    fn stop_flag_is_visible_from_other_threads() {
        let shutdown = Shutdown::new();
        let handle = shutdown.register("worker");
        let (seen_tx, seen_rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            while !handle.is_stop_requested() {
                thread::yield_now();
            }
            seen_tx.send(handle.is_stop_requested()).unwrap();
            handle.signal_exit_ready();
        });

        shutdown.request_stop();
        assert!(seen_rx.recv().unwrap());
        worker.join().unwrap();
        assert!(shutdown.wait_for_exit(Duration::from_secs(1)));
    }

    #[test]
    fn coordinator_reports_stop_through_the_trait() {
        fn stopped(signal: &impl ShutdownSignal) -> bool {
            signal.is_stop_requested()
        }

        let shutdown = Shutdown::new();
        let _worker = shutdown.register("worker");
        assert!(!stopped(&shutdown));
        shutdown.request_stop();
        assert!(stopped(&shutdown));

        ShutdownSignal::signal_exit_ready(&shutdown);
        assert_eq!(shutdown.exited(), 0);
        assert_eq!(shutdown.pending_workers(), vec!["worker".to_string()]);
    }

    #[test]
    fn poisoned_worker_list_still_tracks_registrations() {
        let shutdown = Shutdown::new();
        let _early = shutdown.register("early");

        let poisoner = shutdown.clone();
        let panicked = thread::spawn(move || {
            let _workers = poisoner.inner.workers.lock().unwrap();
            panic!("worker list poisoned");
        })
        .join();
        assert!(panicked.is_err());
        assert!(shutdown.inner.workers.is_poisoned());

        let late = shutdown.register("late");
        assert_eq!(shutdown.registered(), 2);
        assert_eq!(
            shutdown.pending_workers(),
            vec!["early".to_string(), "late".to_string()]
        );
        late.signal_exit_ready();
        assert_eq!(shutdown.pending_workers(), vec!["early".to_string()]);
        assert!(!shutdown.all_exited());
    }

    proptest! {
        #[test]
        fn stop_flag_never_reverts(
            ops in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..64)
        ) {
            let shutdown = Shutdown::new();
            let handle = shutdown.register("worker");
            let mut raised = false;
            for (request, via_handle) in ops {
                if request {
                    if via_handle {
                        handle.request_stop();
                    } else {
                        shutdown.request_stop();
                    }
                    raised = true;
                }
                prop_assert_eq!(shutdown.is_stop_requested(), raised);
                prop_assert_eq!(handle.is_stop_requested(), raised);
            }
        }
    }
}
