//! Statistics registration is the host's concern; the core only needs to call
//! register/deregister at the right moments. A no-op sink is the default; tests use
//! [`CountingStats`] to assert on registration timing (testable property: refcount >= 1
//! iff registered).

use std::collections::HashSet;
use std::sync::Mutex;

/// Registers and deregisters backend objects with the host's statistics subsystem.
pub trait StatsSink: Send + Sync {
    /// Register a newly created backend object under `name`.
    fn register(&self, name: &str);
    /// Deregister a backend object whose reference count reached zero.
    fn deregister(&self, name: &str);
}

/// Discards registrations. Used when a director is constructed without a host stats
/// sink wired in.
#[derive(Default)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn register(&self, _name: &str) {}
    fn deregister(&self, _name: &str) {}
}

/// Tracks the set of currently-registered names, for asserting registry invariants in
/// tests.
#[derive(Default)]
pub struct CountingStats {
    registered: Mutex<HashSet<String>>,
}

impl CountingStats {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.lock().unwrap().contains(name)
    }

    /// Number of names currently registered.
    pub fn registered_count(&self) -> usize {
        self.registered.lock().unwrap().len()
    }
}

impl StatsSink for CountingStats {
    fn register(&self, name: &str) {
        self.registered.lock().unwrap().insert(name.to_string());
    }

    fn deregister(&self, name: &str) {
        self.registered.lock().unwrap().remove(name);
    }
}
