//! The per-(host,port) resolution engine: a background worker that resolves,
//! reconciles against the backend registry, and publishes an address set that request
//! threads select from.
//!
//! The publish-swap of the address set is the teacher's `ArcSwap<Cache<T>>` pattern
//! from `client/cache.rs`/`client/mod.rs`: `refresh_cache` builds a new value off to the
//! side, then `self.cache.store(...)`; `Cache::valid()`'s `created.elapsed() <=
//! max_age` check is the direct ancestor of this module's TTL-expiry check. The worker
//! thread itself is new — the teacher is call-driven, not worker-driven — built with
//! the same small, explicit synchronization primitives the teacher favors over a
//! scheduler abstraction (see [`crate::worker`]).

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;

use crate::director::DirectorInner;
use crate::error::{DynamicError, ResolveFailure};
use crate::events::{self, kind, Level};
use crate::key::{EndpointKey, ShareScope};
use crate::registry::{BackendAttrs, BackendRef};
use crate::resolver::ResolverAdapter;
use crate::worker::{Signal, StopSignal};

/// One resolved endpoint a domain currently serves, paired with the registry handle
/// keeping its backend object alive.
pub(crate) struct Member {
    pub(crate) key: EndpointKey,
    pub(crate) backend: BackendRef,
}

/// The published, read-mostly view of a domain's current resolution result. Iteration
/// order is insertion order; round-robin is driven by [`Domain`]'s cursor against this
/// order, not by any ordering intrinsic to the set itself.
#[derive(Default)]
pub(crate) struct AddressSet {
    pub(crate) members: Vec<Member>,
}

/// Observable lifecycle phase of a domain's worker, exposed for tests and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainPhase {
    /// No successful resolve has published an address set yet.
    Cold,
    /// At least one resolve has succeeded; the domain serves its current address set.
    Warm,
    /// The worker has exited; the domain has released its backends and unlinked from
    /// its director.
    Done,
}

const PHASE_COLD: u8 = 0;
const PHASE_WARM: u8 = 1;
const PHASE_DONE: u8 = 2;

/// Per-(host,port) unit owning a resolution loop thread, a current address set, and
/// references into the backend registry.
pub struct Domain<R: ResolverAdapter> {
    host: Arc<str>,
    port: u16,
    name_tail: String,
    shared: Arc<DirectorInner<R>>,
    address_set: ArcSwapOption<AddressSet>,
    cursor: AtomicUsize,
    last_use: Mutex<Instant>,
    ttl: Mutex<Duration>,
    phase: AtomicU8,
    /// Set when the most recent resolve succeeded but yielded no usable address (all
    /// whitelist-rejected or an empty answer) while the domain was still cold, so
    /// `wait_for_first_lookup` can surface that distinctly from an ordinary cold
    /// timeout. Cleared as soon as a set is actually published.
    empty_result: AtomicBool,
    stop: StopSignal,
    first_lookup: Signal,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<R: ResolverAdapter + 'static> Domain<R> {
    /// Create a domain and start its worker thread. The worker begins resolving
    /// immediately; there is no separate "armed but not yet running" state.
    pub(crate) fn spawn(shared: Arc<DirectorInner<R>>, host: Arc<str>, port: u16) -> Arc<Self> {
        let name_tail = format!("{host}:{port}");
        let domain = Arc::new(Self {
            host,
            port,
            name_tail,
            shared,
            address_set: ArcSwapOption::from(None),
            cursor: AtomicUsize::new(0),
            last_use: Mutex::new(Instant::now()),
            ttl: Mutex::new(Duration::from_secs(0)),
            phase: AtomicU8::new(PHASE_COLD),
            empty_result: AtomicBool::new(false),
            stop: StopSignal::new(),
            first_lookup: Signal::new(),
            worker: Mutex::new(None),
        });
        let worker_domain = domain.clone();
        let handle = std::thread::Builder::new()
            .name(format!("dynamic-domain-{}", worker_domain.name_tail))
            .spawn(move || worker_domain.run())
            .expect("failed to spawn domain worker thread");
        *domain.worker.lock().unwrap() = Some(handle);
        domain
    }

    /// The host this domain resolves.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port this domain resolves under.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current worker lifecycle phase.
    pub fn phase(&self) -> DomainPhase {
        match self.phase.load(Ordering::Acquire) {
            PHASE_COLD => DomainPhase::Cold,
            PHASE_WARM => DomainPhase::Warm,
            _ => DomainPhase::Done,
        }
    }

    /// Number of endpoints in the currently published address set (`0` if cold).
    pub fn address_count(&self) -> usize {
        self.address_set
            .load_full()
            .map(|set| set.members.len())
            .unwrap_or(0)
    }

    fn touch(&self) {
        *self.last_use.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_use.lock().unwrap().elapsed()
    }

    /// Select a backend from the current address set, blocking up to
    /// `first_lookup_timeout` if no resolve has completed yet.
    pub fn pick(&self) -> Result<BackendRef, DynamicError> {
        self.touch();
        let set = match self.address_set.load_full() {
            Some(set) => set,
            None => self.wait_for_first_lookup()?,
        };
        Self::select(&set, &self.cursor)
    }

    fn select(set: &AddressSet, cursor: &AtomicUsize) -> Result<BackendRef, DynamicError> {
        let len = set.members.len();
        if len == 0 {
            return Err(DynamicError::NoHealthyBackend);
        }
        let start = cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..len {
            let member = &set.members[(start + offset) % len];
            if member.backend.object().health().eligible() {
                return Ok(member.backend.clone());
            }
        }
        Err(DynamicError::NoHealthyBackend)
    }

    fn wait_for_first_lookup(&self) -> Result<Arc<AddressSet>, DynamicError> {
        let deadline = Instant::now() + self.shared.config.first_lookup_timeout;
        match self
            .first_lookup
            .wait_until(deadline, || self.address_set.load_full())
        {
            Some(set) => Ok(set),
            None if self.empty_result.load(Ordering::Acquire) => Err(DynamicError::EmptyAddressSet),
            None => Err(DynamicError::ColdTimeout),
        }
    }

    /// Signal the worker to exit at its next wake-up. Does not block. Idempotent.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for the worker thread to exit. Used by the director during `discard`.
    pub(crate) fn join(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn run(self: Arc<Self>) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build domain worker runtime");
        let mut warm = false;

        loop {
            if self.stop.is_stopped() {
                break;
            }

            if warm && self.idle_for() > self.shared.config.domain_usage_timeout {
                events::emit(
                    &self.shared.vcl,
                    &self.shared.name,
                    &self.name_tail,
                    kind::TIMEOUT,
                    None,
                    Level::Warn,
                );
                break;
            }

            match runtime.block_on(self.shared.resolver.resolve_addresses(&self.host)) {
                Ok(lookup) => {
                    self.reconcile(lookup.addresses);
                    self.apply_ttl(lookup.ttl);
                    if self.address_set.load_full().is_some() {
                        self.empty_result.store(false, Ordering::Release);
                        warm = true;
                        self.phase.store(PHASE_WARM, Ordering::Release);
                    } else {
                        // Resolve succeeded but reconcile() published nothing (empty
                        // answer or every address whitelist-rejected): still Cold.
                        self.empty_result.store(true, Ordering::Release);
                    }
                }
                Err(err) => {
                    self.empty_result.store(false, Ordering::Release);
                    events::emit(
                        &self.shared.vcl,
                        &self.shared.name,
                        &self.name_tail,
                        kind::GETADDRINFO,
                        Some(&Getaddrinfo(&err)),
                        Level::Warn,
                    );
                    *self.ttl.lock().unwrap() = self.shared.config.ttl;
                }
            }

            self.first_lookup.notify();

            let sleep_for = *self.ttl.lock().unwrap();
            if self.stop.sleep(sleep_for) {
                break;
            }
        }

        self.exit();
    }

    fn exit(self: Arc<Self>) {
        // Dropping the published set releases every BackendRef it holds, on this
        // worker thread, never on a request thread.
        self.address_set.store(None);
        self.phase.store(PHASE_DONE, Ordering::Release);
        events::emit(
            &self.shared.vcl,
            &self.shared.name,
            &self.name_tail,
            kind::DELETED,
            None,
            Level::Info,
        );
        self.shared.unlink_domain(&self.host, self.port);
    }

    fn backend_attrs(&self) -> BackendAttrs {
        let host_header = match self.shared.config.share {
            ShareScope::Director => self.shared.config.host_header.clone(),
            ShareScope::Host => Some(self.host.clone()),
        };
        BackendAttrs {
            host_header,
            connect_timeout: self.shared.config.connect_timeout,
            first_byte_timeout: self.shared.config.first_byte_timeout,
            between_bytes_timeout: self.shared.config.between_bytes_timeout,
            max_connections: self.shared.config.max_connections,
            proxy_header: self.shared.config.proxy_header,
        }
    }

    fn apply_ttl(&self, dns_ttl: Option<Duration>) {
        let cfg_ttl = self.shared.config.ttl;
        let ttl = match self.shared.config.ttl_from {
            crate::config::TtlFrom::Cfg => cfg_ttl,
            crate::config::TtlFrom::Dns => dns_ttl.unwrap_or(cfg_ttl),
            crate::config::TtlFrom::Min => dns_ttl.map(|d| d.min(cfg_ttl)).unwrap_or(cfg_ttl),
            crate::config::TtlFrom::Max => dns_ttl.map(|d| d.max(cfg_ttl)).unwrap_or(cfg_ttl),
        };
        *self.ttl.lock().unwrap() = ttl;
    }

    /// Reconcile a freshly-resolved address list against the currently published
    /// address set: acquire backends for new keys, keep survivors in their existing
    /// order, drop keys no longer present, and publish the result. Backends for
    /// dropped keys are released only once the new set has replaced the old one.
    fn reconcile(&self, addresses: Vec<IpAddr>) {
        let whitelist = self.shared.config.whitelist.as_deref();
        let mut accepted = Vec::with_capacity(addresses.len());
        for address in addresses {
            match whitelist {
                Some(acl) if !acl.allows(address) => {
                    events::emit(
                        &self.shared.vcl,
                        &self.shared.name,
                        &self.name_tail,
                        kind::WHITELIST_MISMATCH,
                        Some(&address),
                        Level::Warn,
                    );
                }
                _ => accepted.push(address),
            }
        }

        if accepted.is_empty() {
            events::emit(
                &self.shared.vcl,
                &self.shared.name,
                &self.name_tail,
                kind::EMPTY_ADDRESS_SET,
                None,
                Level::Warn,
            );
            return;
        }

        let mut seen = HashSet::new();
        let new_keys: Vec<EndpointKey> = accepted
            .into_iter()
            .map(|address| EndpointKey::new(address, self.port, Some(self.host.clone())))
            .filter(|key| seen.insert(key.clone()))
            .collect();

        let old = self.address_set.load_full();
        let old_members: &[Member] = old.as_deref().map(|s| s.members.as_slice()).unwrap_or(&[]);

        let new_key_set: HashSet<&EndpointKey> = new_keys.iter().collect();
        let old_key_set: HashSet<&EndpointKey> = old_members.iter().map(|m| &m.key).collect();

        if new_key_set == old_key_set {
            // No-op: keep the existing published set pointer-identical, avoiding
            // spurious churn.
            return;
        }

        let mut members: Vec<Member> = Vec::with_capacity(new_keys.len());
        for member in old_members {
            if new_key_set.contains(&member.key) {
                members.push(Member {
                    key: member.key.clone(),
                    backend: member.backend.clone(),
                });
            } else if self.shared.debug() {
                events::emit(
                    &self.shared.vcl,
                    &self.shared.name,
                    &self.name_tail,
                    kind::DELETED,
                    Some(&member.key.address),
                    Level::Info,
                );
            }
        }

        let attrs = self.backend_attrs();
        for key in &new_keys {
            if old_key_set.contains(key) {
                continue;
            }
            let backend = self.shared.registry.acquire(
                &self.shared.name,
                self.shared.config.share,
                key,
                &attrs,
                self.shared.config.probe.as_deref(),
            );
            if self.shared.debug() {
                events::emit(
                    &self.shared.vcl,
                    &self.shared.name,
                    &self.name_tail,
                    kind::ADDED,
                    Some(&key.address),
                    Level::Info,
                );
            }
            members.push(Member {
                key: key.clone(),
                backend,
            });
        }

        self.address_set.store(Some(Arc::new(AddressSet { members })));
        // `old`'s Members (and any backends dropped above) are released here, as this
        // Arc goes out of scope, strictly after the new set has been published.
    }
}

/// Formats a resolver failure as `<code> (<reason>)`, matching the `getaddrinfo
/// <errno> (<reason>)` event shape.
pub(crate) struct Getaddrinfo<'a>(pub(crate) &'a ResolveFailure);

impl fmt::Display for Getaddrinfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.code {
            Some(code) => write!(f, "{code} ({})", self.0.reason),
            None => write!(f, "- ({})", self.0.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectorConfig;
    use crate::director::DirectorInner;
    use crate::registry::BackendRegistry;
    use crate::stats::NullStats;
    use crate::testing::FakeResolver;

    fn shared(config: DirectorConfig) -> Arc<DirectorInner<FakeResolver>> {
        DirectorInner::for_test(
            "test-dir",
            config,
            Arc::new(FakeResolver::new()),
            BackendRegistry::new(Arc::new(NullStats)),
        )
    }

    #[test]
    fn cold_domain_times_out_immediately_at_zero() {
        let shared = shared(DirectorConfig::new().first_lookup_timeout(Duration::ZERO));
        let domain = Domain::spawn(shared, Arc::from("localhost"), 80);
        // No scripted response is queued, so the resolver fails every cycle and the
        // domain never leaves Cold; `first_lookup_timeout = 0` must fail immediately
        // rather than wait out a TTL cycle.
        assert!(matches!(domain.pick(), Err(DynamicError::ColdTimeout)));
        domain.stop();
        domain.join();
    }

    #[test]
    fn cold_domain_with_empty_resolve_result_stays_cold_and_reports_empty_set() {
        let resolver = Arc::new(FakeResolver::new());
        resolver.set_default_addresses(Vec::new(), None);
        let shared = DirectorInner::for_test(
            "test-dir",
            DirectorConfig::new().first_lookup_timeout(Duration::from_millis(50)),
            resolver,
            BackendRegistry::new(Arc::new(NullStats)),
        );
        let domain = Domain::spawn(shared, Arc::from("localhost"), 80);
        assert!(matches!(domain.pick(), Err(DynamicError::EmptyAddressSet)));
        assert_eq!(domain.phase(), DomainPhase::Cold);
        domain.stop();
        domain.join();
    }

    #[test]
    fn reconcile_identical_sets_is_pointer_stable() {
        let resolver = Arc::new(FakeResolver::new());
        resolver.set_default_addresses(vec!["127.0.0.1".parse().unwrap()], None);
        let shared = DirectorInner::for_test(
            "test-dir",
            DirectorConfig::new().ttl(Duration::from_millis(20)),
            resolver,
            BackendRegistry::new(Arc::new(NullStats)),
        );
        let domain = Domain::spawn(shared, Arc::from("localhost"), 80);
        domain
            .pick()
            .expect("first resolve should have populated the address set");
        let first = domain.address_set.load_full().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        let second = domain.address_set.load_full().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        domain.stop();
        domain.join();
    }
}
