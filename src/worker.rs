//! Shared synchronization primitives for domain and service-domain worker threads:
//! a cancellable TTL sleep and a first-lookup condition. Kept separate from
//! [`crate::domain`]/[`crate::service`] since both worker loops need the same two
//! wait/notify shapes, matching the teacher's preference for small, explicit
//! synchronization primitives over a scheduler abstraction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A flag a worker checks at each wake-up, paired with a condition so `stop()` can
/// shorten an in-progress TTL sleep instead of waiting it out.
#[derive(Default)]
pub(crate) struct StopSignal {
    flag: AtomicBool,
    gate: Mutex<()>,
    cvar: Condvar,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Idempotent: a second call only re-notifies an already-set flag.
    pub(crate) fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _guard = self.gate.lock().unwrap();
        self.cvar.notify_all();
    }

    /// Sleep for `duration` unless stopped first. Returns whether a stop was observed,
    /// either already pending or signalled during the sleep.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        let guard = self.gate.lock().unwrap();
        let (_guard, _timeout) = self.cvar.wait_timeout(guard, duration).unwrap();
        self.is_stopped()
    }
}

/// A condition a worker notifies once per resolve attempt (success or failure), so a
/// caller blocked on a cold domain wakes promptly rather than polling.
#[derive(Default)]
pub(crate) struct Signal {
    gate: Mutex<()>,
    cvar: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn notify(&self) {
        let _guard = self.gate.lock().unwrap();
        self.cvar.notify_all();
    }

    /// Block until `ready` produces `Some`, or `deadline` passes, whichever comes
    /// first. Re-checks `ready` once more after the final wait before giving up, so a
    /// notify racing the deadline is not lost.
    pub(crate) fn wait_until<T>(
        &self,
        deadline: Instant,
        mut ready: impl FnMut() -> Option<T>,
    ) -> Option<T> {
        let mut guard = self.gate.lock().unwrap();
        loop {
            if let Some(value) = ready() {
                return Some(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (g, _timeout) = self.cvar.wait_timeout(guard, deadline - now).unwrap();
            guard = g;
        }
    }
}
