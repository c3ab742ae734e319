//! Public entry point called from request processing: routes `.backend(host, port)` or
//! `.service(name)` to a domain or service domain, creating it on first use.
//!
//! The consuming-builder shape of [`crate::config::DirectorConfig`] mirrors the
//! teacher's `SrvClient::{srv_name, resolver, policy, http_scheme, path_prefix}`
//! methods in `client/mod.rs`. The find-or-create domain map is new — the teacher has
//! exactly one implicit "domain" per client — grounded on the same `ArcSwap`-guarded
//! idiom used for the address set, scaled up with an outer `Mutex<HashMap<...>>` for
//! the rarely-mutated domain map itself, since §5 only requires that mutex be held
//! briefly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use crate::config::{resolve_port, DirectorConfig};
use crate::domain::Domain;
use crate::error::{ConfigError, DynamicError};
use crate::registry::{BackendRef, BackendRegistry};
use crate::resolver::ResolverAdapter;
use crate::service::ServiceDomain;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Lifecycle {
    Warm = 0,
    Cooling = 1,
    Discarded = 2,
}

/// State shared by every domain and service domain a director owns: its resolved
/// configuration, resolver handle, backend registry, and the domain/service-domain
/// maps themselves. Domains and service domains hold an `Arc` of this rather than of
/// [`Director`] so they can call back into it (unlinking themselves, creating SRV
/// children) without depending on the public, by-value `discard` API.
pub(crate) struct DirectorInner<R: ResolverAdapter> {
    pub(crate) vcl: Arc<str>,
    pub(crate) name: Arc<str>,
    pub(crate) config: DirectorConfig,
    pub(crate) resolver: Arc<R>,
    pub(crate) registry: BackendRegistry,
    domains: Mutex<HashMap<(Arc<str>, u16), Arc<Domain<R>>>>,
    services: Mutex<HashMap<Arc<str>, Arc<ServiceDomain<R>>>>,
    debug: AtomicBool,
    lifecycle: AtomicU8,
}

impl<R: ResolverAdapter + 'static> DirectorInner<R> {
    pub(crate) fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    fn lifecycle(&self) -> Lifecycle {
        match self.lifecycle.load(Ordering::Acquire) {
            0 => Lifecycle::Warm,
            1 => Lifecycle::Cooling,
            _ => Lifecycle::Discarded,
        }
    }

    /// Called by a domain's worker thread as it exits, to remove itself from the map.
    pub(crate) fn unlink_domain(&self, host: &str, port: u16) {
        let mut domains = self.domains.lock().unwrap();
        domains.retain(|(h, p), _| !(h.as_ref() == host && *p == port));
    }

    /// Called by a service domain's worker thread as it exits.
    pub(crate) fn unlink_service(&self, name: &str) {
        self.services.lock().unwrap().remove(name);
    }

    /// Find or lazily create the domain for (host, port). Fails rather than creating a
    /// new domain while the director is cooling or discarded; an existing domain is
    /// still returned regardless of lifecycle.
    pub(crate) fn get_or_create_domain(
        self: &Arc<Self>,
        host: Arc<str>,
        port: u16,
    ) -> Result<Arc<Domain<R>>, DynamicError> {
        let mut domains = self.domains.lock().unwrap();
        if let Some(domain) = domains.get(&(host.clone(), port)) {
            return Ok(domain.clone());
        }
        if self.lifecycle() != Lifecycle::Warm {
            return Err(DynamicError::UnsupportedOperation);
        }
        let domain = Domain::spawn(self.clone(), host.clone(), port);
        domains.insert((host, port), domain.clone());
        Ok(domain)
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        name: &str,
        config: DirectorConfig,
        resolver: Arc<R>,
        registry: BackendRegistry,
    ) -> Arc<Self> {
        Arc::new(Self {
            vcl: Arc::from("vcl"),
            name: Arc::from(name),
            config,
            resolver,
            registry,
            domains: Mutex::new(HashMap::new()),
            services: Mutex::new(HashMap::new()),
            debug: AtomicBool::new(false),
            lifecycle: AtomicU8::new(Lifecycle::Warm as u8),
        })
    }
}

/// The configured object routing `.backend()`/`.service()` calls to a dynamic set of
/// backends, generic over the [`ResolverAdapter`] it resolves through.
pub struct Director<R: ResolverAdapter> {
    inner: Arc<DirectorInner<R>>,
}

impl<R: ResolverAdapter + 'static> Director<R> {
    /// Construct a director. `resolver` is required for `.service()` and for any
    /// `ttl_from` other than [`crate::config::TtlFrom::Cfg`]; those constraints are
    /// validated here and reported as [`ConfigError`], fatal to construction.
    pub fn new(
        name: impl Into<Arc<str>>,
        config: DirectorConfig,
        resolver: Arc<R>,
        registry: BackendRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate(resolver.supports_ttl())?;
        Ok(Self {
            inner: Arc::new(DirectorInner {
                vcl: Arc::from("vcl"),
                name: name.into(),
                config,
                resolver,
                registry,
                domains: Mutex::new(HashMap::new()),
                services: Mutex::new(HashMap::new()),
                debug: AtomicBool::new(false),
                lifecycle: AtomicU8::new(Lifecycle::Warm as u8),
            }),
        })
    }

    /// This director's configured name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Toggle emission of per-backend `added`/`deleted` debug events during
    /// reconciliation.
    pub fn debug(&self, on: bool) {
        self.inner.debug.store(on, Ordering::Relaxed);
    }

    fn get_or_create_service(&self, name: Arc<str>) -> Result<Arc<ServiceDomain<R>>, DynamicError> {
        if !self.inner.resolver.supports_srv() {
            return Err(DynamicError::UnsupportedOperation);
        }
        let mut services = self.inner.services.lock().unwrap();
        if let Some(service) = services.get(&name) {
            return Ok(service.clone());
        }
        if self.inner.lifecycle() != Lifecycle::Warm {
            return Err(DynamicError::UnsupportedOperation);
        }
        let service = ServiceDomain::spawn(self.inner.clone(), name.clone());
        services.insert(name, service.clone());
        Ok(service)
    }

    /// Resolve `.backend(host, port)`. An empty `host` falls back to `request_host`
    /// (the in-flight request's `Host` header, supplied by the host environment); an
    /// empty `port` falls back to the director's configured default port.
    pub fn backend(
        &self,
        host: Option<&str>,
        port: Option<&str>,
        request_host: Option<&str>,
    ) -> Result<BackendRef, DynamicError> {
        let host = match host.filter(|h| !h.is_empty()) {
            Some(host) => host,
            None => request_host
                .filter(|h| !h.is_empty())
                .ok_or(DynamicError::MissingHost)?,
        };
        let port = match port.filter(|p| !p.is_empty()) {
            Some(port) => resolve_port(port)?,
            None => self.inner.config.port,
        };
        let domain = self.inner.get_or_create_domain(Arc::from(host), port)?;
        domain.pick()
    }

    /// Resolve `.service(name)`. Requires a resolver capable of SRV lookups; calling
    /// this on a director built without one is a configuration error reported here,
    /// at the call site, per §4.4.
    pub fn service(&self, name: &str) -> Result<BackendRef, DynamicError> {
        if name.is_empty() {
            return Err(DynamicError::InvalidArgument(
                "service name must not be empty",
            ));
        }
        let service = self.get_or_create_service(Arc::from(name))?;
        service.pick()
    }

    /// Host lifecycle hook: start worker threads that should already be running.
    /// Idempotent — domains and service domains start their workers at creation, so
    /// `warm` only needs to clear a prior `cool()`.
    pub fn warm(&self) {
        self.inner
            .lifecycle
            .store(Lifecycle::Warm as u8, Ordering::Release);
    }

    /// Host lifecycle hook: stop accepting new domains/service domains. Existing ones
    /// keep running (and keep serving `pick()`) until `discard`.
    pub fn cool(&self) {
        self.inner
            .lifecycle
            .store(Lifecycle::Cooling as u8, Ordering::Release);
    }

    /// Host lifecycle hook: wait for every domain and service domain to reach `Done`,
    /// then release the director. Blocks with no timeout by design — `cool` must
    /// precede `discard`.
    pub fn discard(self) {
        self.inner
            .lifecycle
            .store(Lifecycle::Discarded as u8, Ordering::Release);

        let domains: Vec<_> = self
            .inner
            .domains
            .lock()
            .unwrap()
            .drain()
            .map(|(_, domain)| domain)
            .collect();
        for domain in &domains {
            domain.stop();
        }
        for domain in &domains {
            domain.join();
        }

        let services: Vec<_> = self
            .inner
            .services
            .lock()
            .unwrap()
            .drain()
            .map(|(_, service)| service)
            .collect();
        for service in &services {
            service.stop();
        }
        for service in &services {
            service.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::NullStats;
    use crate::testing::FakeResolver;
    use std::time::Duration;

    fn director() -> Director<FakeResolver> {
        let resolver = Arc::new(FakeResolver::new());
        resolver.set_default_addresses(vec!["127.0.0.1".parse().unwrap()], None);
        Director::new(
            "d1",
            DirectorConfig::new().first_lookup_timeout(Duration::from_millis(200)),
            resolver,
            BackendRegistry::new(Arc::new(NullStats)),
        )
        .unwrap()
    }

    #[test]
    fn at_most_one_domain_per_host_port() {
        let director = director();
        let a = director.backend(Some("example.com"), Some("80"), None).unwrap();
        let b = director.backend(Some("example.com"), Some("80"), None).unwrap();
        assert!(std::ptr::eq(a.object(), b.object()));
        assert_eq!(director.inner.domains.lock().unwrap().len(), 1);
    }

    #[test]
    fn empty_host_falls_back_to_request_host() {
        let director = director();
        let result = director.backend(Some(""), None, Some("example.com"));
        assert!(result.is_ok());
    }

    #[test]
    fn missing_host_entirely_is_an_error() {
        let director = director();
        assert!(matches!(
            director.backend(None, None, None),
            Err(DynamicError::MissingHost)
        ));
    }

    #[test]
    fn service_without_srv_support_is_unsupported() {
        let director = director();
        assert!(matches!(
            director.service("_http._tcp.example.com"),
            Err(DynamicError::UnsupportedOperation)
        ));
    }

    #[test]
    fn cooling_rejects_new_domains_but_serves_existing() {
        let director = director();
        director
            .backend(Some("example.com"), Some("80"), None)
            .unwrap();
        director.cool();
        assert!(director
            .backend(Some("example.com"), Some("80"), None)
            .is_ok());
        assert!(director.backend(Some("other.com"), Some("80"), None).is_err());
    }
}
