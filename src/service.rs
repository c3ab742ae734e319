//! Domain variant driven by SRV records: owns child domains (one per target) and
//! selects among them by priority and weight.
//!
//! The weighted-tier selection reuses [`crate::record::sort_key`], the same function
//! the teacher's `Rfc2782` policy (`client/policy.rs`) and `SrvRecord::sort_key`
//! (`record.rs`) used to order candidate request URIs — here it orders candidate child
//! domains instead. Sorting the full candidate list by `(priority, Reverse(weight *
//! random))` and walking it in order both selects the weighted-random winner within
//! the lowest non-empty priority tier and naturally falls through to the next tier
//! when every member of the current one fails its own `pick()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::TtlFrom;
use crate::director::DirectorInner;
use crate::domain::{Domain, Getaddrinfo};
use crate::error::DynamicError;
use crate::events::{self, kind, Level};
use crate::record::{self, SrvRecord};
use crate::registry::BackendRef;
use crate::resolver::ResolverAdapter;
use crate::worker::{Signal, StopSignal};

/// A child domain this service domain currently routes to, plus the SRV metadata that
/// governs selection. This is a relation and a lookup, not ownership: the child
/// [`Domain`] is owned by the director's domain map; losing an entry here does not stop
/// the child, which idles out on its own schedule if nothing else references it.
struct ChildEntry<R: ResolverAdapter> {
    priority: u16,
    weight: u16,
    domain: Arc<Domain<R>>,
}

impl<R: ResolverAdapter> Clone for ChildEntry<R> {
    fn clone(&self) -> Self {
        Self {
            priority: self.priority,
            weight: self.weight,
            domain: self.domain.clone(),
        }
    }
}

/// Overlays [`Domain`] for SRV records: each resolution cycle resolves a service name
/// to a set of SRV records and reconciles the set of child domains against it.
pub struct ServiceDomain<R: ResolverAdapter> {
    name: Arc<str>,
    shared: Arc<DirectorInner<R>>,
    children: Mutex<Vec<ChildEntry<R>>>,
    last_use: Mutex<Instant>,
    ttl: Mutex<Duration>,
    resolved: AtomicBool,
    stop: StopSignal,
    first_lookup: Signal,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<R: ResolverAdapter + 'static> ServiceDomain<R> {
    pub(crate) fn spawn(shared: Arc<DirectorInner<R>>, name: Arc<str>) -> Arc<Self> {
        let service = Arc::new(Self {
            name,
            shared,
            children: Mutex::new(Vec::new()),
            last_use: Mutex::new(Instant::now()),
            ttl: Mutex::new(Duration::from_secs(0)),
            resolved: AtomicBool::new(false),
            stop: StopSignal::new(),
            first_lookup: Signal::new(),
            worker: Mutex::new(None),
        });
        let worker_service = service.clone();
        let handle = std::thread::Builder::new()
            .name(format!("dynamic-service-{}", worker_service.name))
            .spawn(move || worker_service.run())
            .expect("failed to spawn service domain worker thread");
        *service.worker.lock().unwrap() = Some(handle);
        service
    }

    /// The SRV service name this service domain resolves.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn touch(&self) {
        *self.last_use.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_use.lock().unwrap().elapsed()
    }

    /// Select a child domain by SRV priority/weight and delegate to its `pick()`. A
    /// child whose own `pick()` fails is skipped in favor of the next-best candidate in
    /// its tier, then the next tier, before giving up.
    pub fn pick(&self) -> Result<BackendRef, DynamicError> {
        self.touch();
        if !self.resolved.load(Ordering::Acquire) {
            self.wait_for_first_lookup()?;
        }

        let mut candidates: Vec<ChildEntry<R>> = self.children.lock().unwrap().clone();
        if candidates.is_empty() {
            return Err(DynamicError::NoHealthyBackend);
        }

        let mut rng = rand::rng();
        candidates.sort_by_cached_key(|child| record::sort_key(child.priority, child.weight, &mut rng));

        for child in candidates {
            if let Ok(backend) = child.domain.pick() {
                return Ok(backend);
            }
        }
        Err(DynamicError::NoHealthyBackend)
    }

    fn wait_for_first_lookup(&self) -> Result<(), DynamicError> {
        let deadline = Instant::now() + self.shared.config.first_lookup_timeout;
        self.first_lookup
            .wait_until(deadline, || {
                self.resolved.load(Ordering::Acquire).then_some(())
            })
            .ok_or(DynamicError::ColdTimeout)
    }

    /// Signal the worker to exit at its next wake-up. Does not block. Idempotent.
    pub fn stop(&self) {
        self.stop.stop();
    }

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
            .expect("failed to build service domain worker runtime");
        let mut warm = false;

        loop {
            if self.stop.is_stopped() {
                break;
            }

            if warm && self.idle_for() > self.shared.config.domain_usage_timeout {
                events::emit(&self.shared.vcl, &self.shared.name, &self.name, kind::TIMEOUT, None, Level::Warn);
                break;
            }

            match runtime.block_on(self.shared.resolver.resolve_srv(&self.name)) {
                Ok(lookup) => {
                    self.reconcile(lookup.records);
                    self.apply_ttl(lookup.ttl);
                    warm = true;
                }
                Err(err) => {
                    events::emit(
                        &self.shared.vcl,
                        &self.shared.name,
                        &self.name,
                        kind::GETADDRINFO,
                        Some(&Getaddrinfo(&err)),
                        Level::Warn,
                    );
                    *self.ttl.lock().unwrap() = self.shared.config.ttl;
                }
            }

            self.resolved.store(true, Ordering::Release);
            self.first_lookup.notify();

            let sleep_for = *self.ttl.lock().unwrap();
            if self.stop.sleep(sleep_for) {
                break;
            }
        }

        events::emit(&self.shared.vcl, &self.shared.name, &self.name, kind::DELETED, None, Level::Info);
        self.shared.unlink_service(&self.name);
    }

    /// Ensure a child domain exists for each SRV target in the response (creating it
    /// lazily through the parent director's domain map) and drop entries for targets
    /// that no longer appear. A target the director refuses to create (cooling or
    /// discarded) is skipped this cycle; it will be retried on the next.
    fn reconcile(&self, records: Vec<R::SrvRecord>) {
        let mut fresh = Vec::with_capacity(records.len());
        for record in records {
            let target = record.target().to_string();
            let target: Arc<str> = Arc::from(target.trim_end_matches('.'));
            if let Ok(domain) = self.shared.get_or_create_domain(target, record.port()) {
                fresh.push(ChildEntry {
                    priority: record.priority(),
                    weight: record.weight(),
                    domain,
                });
            }
        }
        *self.children.lock().unwrap() = fresh;
    }

    fn apply_ttl(&self, dns_ttl: Option<Duration>) {
        let cfg_ttl = self.shared.config.ttl;
        let ttl = match self.shared.config.ttl_from {
            TtlFrom::Cfg => cfg_ttl,
            TtlFrom::Dns => dns_ttl.unwrap_or(cfg_ttl),
            TtlFrom::Min => dns_ttl.map(|d| d.min(cfg_ttl)).unwrap_or(cfg_ttl),
            TtlFrom::Max => dns_ttl.map(|d| d.max(cfg_ttl)).unwrap_or(cfg_ttl),
        };
        *self.ttl.lock().unwrap() = ttl;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectorConfig;
    use crate::director::DirectorInner;
    use crate::registry::BackendRegistry;
    use crate::stats::NullStats;
    use crate::testing::{FakeResolver, FakeSrvRecord};
    use std::collections::HashMap;

    fn srv_shared(resolver: Arc<FakeResolver>) -> Arc<DirectorInner<FakeResolver>> {
        DirectorInner::for_test(
            "svc-dir",
            DirectorConfig::new().ttl(Duration::from_secs(60)),
            resolver,
            BackendRegistry::new(Arc::new(NullStats)),
        )
    }

    #[test]
    fn weighted_selection_favors_higher_weight_within_lowest_priority() {
        let resolver = Arc::new(FakeResolver::new());
        resolver.set_default_srv(
            vec![
                FakeSrvRecord { target: "t1.".into(), port: 80, priority: 10, weight: 1 },
                FakeSrvRecord { target: "t2.".into(), port: 80, priority: 10, weight: 3 },
                FakeSrvRecord { target: "t3.".into(), port: 80, priority: 20, weight: 1 },
            ],
            None,
        );
        resolver.set_default_addresses(vec!["127.0.0.1".parse().unwrap()], None);

        let shared = srv_shared(resolver);
        let service = ServiceDomain::spawn(shared, Arc::from("_http._tcp.example.com"));

        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..2000 {
            let backend = service.pick().expect("pick should succeed");
            *counts.entry(backend.object().key.to_string()).or_insert(0) += 1;
        }

        assert_eq!(
            counts.len(),
            2,
            "t3 (priority 20) should never be chosen while t1/t2 (priority 10) are eligible: {counts:?}"
        );
        service.stop();
        service.join();
    }
}
