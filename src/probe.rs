//! Health probing is the host's job; the core only carries a template to clone per
//! acquired backend and reads back a health verdict when selecting among members.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Health as observed by a host-managed probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Health {
    /// The probe's last check succeeded.
    Healthy,
    /// The probe's last check failed.
    Sick,
    /// No probe attached, or no verdict yet: treated as eligible, same as `Healthy`.
    Unknown,
}

impl Health {
    /// Whether a member in this health state may be selected by `pick()`.
    pub fn eligible(self) -> bool {
        !matches!(self, Health::Sick)
    }

    fn to_u8(self) -> u8 {
        match self {
            Health::Healthy => 0,
            Health::Sick => 1,
            Health::Unknown => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Health::Healthy,
            1 => Health::Sick,
            _ => Health::Unknown,
        }
    }
}

/// A host-supplied template cloned per acquired backend. Concrete probe wiring (the
/// transport, interval, expected response) is the host's concern; the core only needs a
/// handle it can attach and a way to read the current verdict.
pub trait ProbeTemplate: Send + Sync {
    /// Attach a new, independent probe instance for a newly created backend object.
    /// `host_header` is the Host header the probe should present: the director's
    /// `host_header` parameter under DIRECTOR scope, or the domain's own hostname
    /// under HOST scope (see `Domain::backend_attrs`).
    fn attach(&self, host_header: Option<&str>) -> Arc<dyn ProbeHandle>;
}

/// A live probe attached to one backend object.
pub trait ProbeHandle: Send + Sync {
    /// The probe's current health verdict.
    fn health(&self) -> Health;
}

/// A probe handle whose verdict can be set directly, used when no real probe subsystem
/// is wired in (the default) and in tests that need to flip a backend's health.
pub struct StaticProbe(AtomicU8);

impl StaticProbe {
    /// Create a probe handle fixed at `initial` until [`Self::set`] is called.
    pub fn new(initial: Health) -> Self {
        Self(AtomicU8::new(initial.to_u8()))
    }

    /// Overwrite the current verdict.
    pub fn set(&self, health: Health) {
        self.0.store(health.to_u8(), Ordering::Relaxed);
    }
}

impl Default for StaticProbe {
    fn default() -> Self {
        Self::new(Health::Unknown)
    }
}

impl ProbeHandle for StaticProbe {
    fn health(&self) -> Health {
        Health::from_u8(self.0.load(Ordering::Relaxed))
    }
}
