//! Shared map from [`RegistryKey`] to backend object, with reference counting.
//!
//! Generalizes the `HashMap<String, Arc<NativeBackend>>` key→handle map used by the
//! pack's backend pool (keyed by `"{address}:{port}"`, reused across reloads) into a
//! refcounted registry keyed by [`RegistryKey`], with two lifetimes: a process-wide
//! registry for [`ShareScope::Director`] and a director-owned registry for
//! [`ShareScope::Host`] (see the design notes on global mutable state).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::key::{EndpointKey, RegistryKey, ShareScope};
use crate::probe::{ProbeHandle, ProbeTemplate};
use crate::stats::StatsSink;

/// Per-backend configuration supplied by a director at acquire time. Only consulted
/// when a new backend object is created; an existing, shared backend keeps whatever
/// attributes it was first created with.
#[derive(Clone, Default)]
pub struct BackendAttrs {
    /// Host header override. `None` means the backend carries no override.
    pub host_header: Option<Arc<str>>,
    /// Per-backend connect timeout. `None` inherits the host's global default.
    pub connect_timeout: Option<std::time::Duration>,
    /// Per-backend first-byte timeout. `None` inherits the host's global default.
    pub first_byte_timeout: Option<std::time::Duration>,
    /// Per-backend between-bytes timeout. `None` inherits the host's global default.
    pub between_bytes_timeout: Option<std::time::Duration>,
    /// Per-backend connection cap. `0` means unlimited.
    pub max_connections: usize,
    /// PROXY protocol version attached to the backend: `0` (off), `1`, or `2`.
    pub proxy_header: u8,
}

/// A host-visible backend endpoint. Lives in the registry for as long as its reference
/// count is nonzero. A single object may be referenced by more than one director (under
/// [`ShareScope::Director`]); `director_refs` tracks, per acquiring director, how many
/// live [`BackendRef`]s it holds, so each director gets its own stats registration under
/// its own name rather than the object being registered once, globally, under no
/// director's name at all.
pub struct BackendObject {
    /// The key this object is registered under in its [`BackendRegistry`].
    pub key: RegistryKey,
    /// The resolved network address.
    pub address: IpAddr,
    /// The resolved port.
    pub port: u16,
    /// Timeouts, connection cap, and PROXY version this object was created with.
    pub attrs: BackendAttrs,
    /// Health probe attached at creation, if any.
    pub probe: Option<Arc<dyn ProbeHandle>>,
    refs: AtomicUsize,
    director_refs: Mutex<HashMap<Arc<str>, usize>>,
}

impl BackendObject {
    /// Current health as reported by the attached probe, or [`crate::probe::Health::Unknown`]
    /// if none is attached.
    pub fn health(&self) -> crate::probe::Health {
        self.probe
            .as_ref()
            .map(|p| p.health())
            .unwrap_or(crate::probe::Health::Unknown)
    }

    /// The name this object is registered under with the host's stats subsystem when
    /// referenced by `director`, per §3's `director(host.addr:port)` /
    /// `director(addr:port)` naming scheme.
    pub fn stats_name_for(&self, director: &str) -> String {
        match &self.key {
            RegistryKey::Director { address, port } => format!("{director}({address}:{port})"),
            RegistryKey::Host { host, address, port } => {
                format!("{director}({host}.{address}:{port})")
            }
        }
    }
}

struct Inner {
    objects: Mutex<HashMap<RegistryKey, Arc<BackendObject>>>,
    stats: Arc<dyn StatsSink>,
}

/// Shared, refcounted map from endpoint key to backend object.
#[derive(Clone)]
pub struct BackendRegistry {
    inner: Arc<Inner>,
}

impl BackendRegistry {
    /// Create an empty registry reporting registrations/deregistrations to `stats`.
    pub fn new(stats: Arc<dyn StatsSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                objects: Mutex::new(HashMap::new()),
                stats,
            }),
        }
    }

    /// Acquire a [`BackendRef`] for `key` under `scope` on behalf of `director`,
    /// creating the backend object (cloning `probe` onto it) if this is the first
    /// reference from any director. `attrs` only takes effect on creation. Stats
    /// registration happens per acquiring director: the first acquire by a given
    /// director registers that director's own name for this object, even when the
    /// object itself is shared with other directors under [`ShareScope::Director`].
    pub fn acquire(
        &self,
        director: &Arc<str>,
        scope: ShareScope,
        key: &EndpointKey,
        attrs: &BackendAttrs,
        probe: Option<&dyn ProbeTemplate>,
    ) -> BackendRef {
        let registry_key = key.registry_key(scope);
        let mut objects = self.inner.objects.lock().unwrap();
        let object = objects
            .entry(registry_key.clone())
            .or_insert_with(|| {
                Arc::new(BackendObject {
                    key: registry_key.clone(),
                    address: key.address,
                    port: key.port,
                    attrs: attrs.clone(),
                    probe: probe.map(|p| p.attach(attrs.host_header.as_deref())),
                    refs: AtomicUsize::new(0),
                    director_refs: Mutex::new(HashMap::new()),
                })
            })
            .clone();
        object.refs.fetch_add(1, Ordering::AcqRel);
        {
            let mut director_refs = object.director_refs.lock().unwrap();
            let count = director_refs.entry(director.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                self.inner.stats.register(&object.stats_name_for(director));
            }
        }
        BackendRef {
            registry: self.inner.clone(),
            object,
            director: director.clone(),
        }
    }

    /// Number of distinct backend objects currently registered.
    pub fn len(&self) -> usize {
        self.inner.objects.lock().unwrap().len()
    }

    /// Whether the registry currently holds no backend objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A reference-counted handle to a shared backend object, acquired on behalf of one
/// director. Dropping the last [`BackendRef`] for a key destroys the backend object;
/// dropping the last [`BackendRef`] a given director held for it deregisters that
/// director's own stats name, independently of whether other directors still hold the
/// object.
pub struct BackendRef {
    registry: Arc<Inner>,
    object: Arc<BackendObject>,
    director: Arc<str>,
}

impl BackendRef {
    /// The backend object this handle references.
    pub fn object(&self) -> &BackendObject {
        &self.object
    }
}

impl Clone for BackendRef {
    fn clone(&self) -> Self {
        self.object.refs.fetch_add(1, Ordering::AcqRel);
        *self
            .object
            .director_refs
            .lock()
            .unwrap()
            .entry(self.director.clone())
            .or_insert(0) += 1;
        Self {
            registry: self.registry.clone(),
            object: self.object.clone(),
            director: self.director.clone(),
        }
    }
}

impl Drop for BackendRef {
    fn drop(&mut self) {
        let last_total = self.object.refs.fetch_sub(1, Ordering::AcqRel) == 1;

        let deregister_name = {
            let mut director_refs = self.object.director_refs.lock().unwrap();
            match director_refs.get_mut(&self.director) {
                Some(count) => {
                    *count -= 1;
                    if *count == 0 {
                        director_refs.remove(&self.director);
                        Some(self.object.stats_name_for(&self.director))
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(name) = deregister_name {
            self.registry.stats.deregister(&name);
        }

        if last_total {
            let mut objects = self.registry.objects.lock().unwrap();
            // Another acquire may have raced in between the fetch_sub above and taking
            // the lock; only remove if the count is still zero under the lock.
            if self.object.refs.load(Ordering::Acquire) == 0 {
                objects.remove(&self.object.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CountingStats;

    fn key(addr: &str, port: u16) -> EndpointKey {
        EndpointKey::new(addr.parse().unwrap(), port, None)
    }

    fn director(name: &str) -> Arc<str> {
        Arc::from(name)
    }

    #[test]
    fn acquire_then_release_leaves_registry_unchanged() {
        let stats = Arc::new(CountingStats::new());
        let registry = BackendRegistry::new(stats.clone());
        let k = key("127.0.0.1", 80);
        let dir = director("d1");
        let r = registry.acquire(&dir, ShareScope::Director, &k, &BackendAttrs::default(), None);
        assert_eq!(registry.len(), 1);
        assert!(stats.is_registered(&r.object().stats_name_for(&dir)));
        drop(r);
        assert_eq!(registry.len(), 0);
        assert_eq!(stats.registered_count(), 0);
    }

    #[test]
    fn director_scope_shares_one_object() {
        let registry = BackendRegistry::new(Arc::new(CountingStats::new()));
        let k = key("127.0.0.1", 80);
        let dir = director("d1");
        let a = registry.acquire(&dir, ShareScope::Director, &k, &BackendAttrs::default(), None);
        let b = registry.acquire(&dir, ShareScope::Director, &k, &BackendAttrs::default(), None);
        assert!(Arc::ptr_eq(&a.object, &b.object));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn host_scope_distinguishes_hostnames() {
        let registry = BackendRegistry::new(Arc::new(CountingStats::new()));
        let a = EndpointKey::new("127.0.0.1".parse().unwrap(), 80, Some(Arc::from("a.test")));
        let b = EndpointKey::new("127.0.0.1".parse().unwrap(), 80, Some(Arc::from("b.test")));
        let dir = director("d1");
        let ra = registry.acquire(&dir, ShareScope::Host, &a, &BackendAttrs::default(), None);
        let rb = registry.acquire(&dir, ShareScope::Host, &b, &BackendAttrs::default(), None);
        assert!(!Arc::ptr_eq(&ra.object, &rb.object));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn two_directors_sharing_an_object_each_get_their_own_stats_name() {
        let stats = Arc::new(CountingStats::new());
        let registry = BackendRegistry::new(stats.clone());
        let k = key("127.0.0.1", 80);
        let dir_a = director("a");
        let dir_b = director("b");
        let ra = registry.acquire(&dir_a, ShareScope::Director, &k, &BackendAttrs::default(), None);
        let rb = registry.acquire(&dir_b, ShareScope::Director, &k, &BackendAttrs::default(), None);
        assert!(Arc::ptr_eq(&ra.object, &rb.object));
        assert!(stats.is_registered(&ra.object().stats_name_for(&dir_a)));
        assert!(stats.is_registered(&rb.object().stats_name_for(&dir_b)));
        assert_ne!(ra.object().stats_name_for(&dir_a), rb.object().stats_name_for(&dir_b));

        let name_a = ra.object().stats_name_for(&dir_a);
        drop(ra);
        // `a`'s stats name is gone, but the shared object and `b`'s registration
        // survive since `b` still holds a reference.
        assert!(!stats.is_registered(&name_a));
        assert_eq!(registry.len(), 1);
        assert!(stats.is_registered(&rb.object().stats_name_for(&dir_b)));

        drop(rb);
        assert_eq!(registry.len(), 0);
        assert_eq!(stats.registered_count(), 0);
    }
}
