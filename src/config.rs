//! Director configuration surface: a consuming builder mirroring the constructor
//! parameter table, in the shape of the teacher's consuming `SrvClient` setters
//! (`client/mod.rs`'s `srv_name`/`resolver`/`policy`/`http_scheme`/`path_prefix`, each
//! of which consumes `self` and returns a reconfigured value). Validation is
//! concentrated in [`Director::new`](crate::director::Director::new), mirroring how the
//! teacher's setters never fail — the one terminal, fallible call is construction.

use std::sync::Arc;
use std::time::Duration;

use crate::acl::Whitelist;
use crate::error::ConfigError;
use crate::key::ShareScope;
use crate::probe::ProbeTemplate;

/// Governs which TTL a domain's worker sleeps for between resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtlFrom {
    /// Always use the configured `ttl`, ignoring any TTL the resolver can supply.
    Cfg,
    /// Use the resolver's TTL when present, falling back to the configured `ttl`.
    Dns,
    /// Use the smaller of the resolver's TTL and the configured `ttl`.
    Min,
    /// Use the larger of the resolver's TTL and the configured `ttl`.
    Max,
}

impl Default for TtlFrom {
    fn default() -> Self {
        TtlFrom::Cfg
    }
}

/// Consuming builder for a [`crate::director::Director`]'s parameters.
#[derive(Clone)]
pub struct DirectorConfig {
    pub(crate) port: u16,
    pub(crate) host_header: Option<Arc<str>>,
    pub(crate) share: ShareScope,
    pub(crate) probe: Option<Arc<dyn ProbeTemplate>>,
    pub(crate) whitelist: Option<Arc<dyn Whitelist>>,
    pub(crate) ttl: Duration,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) first_byte_timeout: Option<Duration>,
    pub(crate) between_bytes_timeout: Option<Duration>,
    pub(crate) domain_usage_timeout: Duration,
    pub(crate) first_lookup_timeout: Duration,
    pub(crate) max_connections: usize,
    pub(crate) proxy_header: u8,
    pub(crate) ttl_from: TtlFrom,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            port: 80,
            host_header: None,
            share: ShareScope::Director,
            probe: None,
            whitelist: None,
            ttl: Duration::from_secs(3600),
            connect_timeout: None,
            first_byte_timeout: None,
            between_bytes_timeout: None,
            domain_usage_timeout: Duration::from_secs(7200),
            first_lookup_timeout: Duration::from_secs(10),
            max_connections: 0,
            proxy_header: 0,
            ttl_from: TtlFrom::Cfg,
        }
    }
}

impl DirectorConfig {
    /// Start from the documented defaults (`port = http`, `ttl = 3600s`,
    /// `domain_usage_timeout = 7200s`, `first_lookup_timeout = 10s`, `share =
    /// DIRECTOR`, `ttl_from = cfg`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Default port for `.backend()` calls when the caller passes an empty one.
    /// Accepts a numeric port or a symbolic name (`http`, `https`).
    pub fn port(mut self, port: &str) -> Result<Self, ConfigError> {
        self.port = resolve_port(port)?;
        Ok(self)
    }

    /// Default `Host` header for backends, and for DIRECTOR-scope probes.
    pub fn host_header(mut self, host_header: impl Into<Arc<str>>) -> Self {
        self.host_header = Some(host_header.into());
        self
    }

    /// Backend sharing scope: whether the registry dedupes by address+port
    /// ([`ShareScope::Director`]) or by the full (host, address, port) triple
    /// ([`ShareScope::Host`]).
    pub fn share(mut self, share: ShareScope) -> Self {
        self.share = share;
        self
    }

    /// Probe template cloned per acquired backend.
    pub fn probe(mut self, probe: Arc<dyn ProbeTemplate>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// ACL filtering resolved addresses before they're acquired as backends.
    pub fn whitelist(mut self, whitelist: Arc<dyn Whitelist>) -> Self {
        self.whitelist = Some(whitelist);
        self
    }

    /// Minimum resolve interval, and the fallback TTL whenever `ttl_from` can't
    /// produce one from the resolver.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Per-backend connect timeout. Unset inherits the host's global default.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Per-backend first-byte timeout. Unset inherits the host's global default.
    pub fn first_byte_timeout(mut self, timeout: Duration) -> Self {
        self.first_byte_timeout = Some(timeout);
        self
    }

    /// Per-backend between-bytes timeout. Unset inherits the host's global default.
    pub fn between_bytes_timeout(mut self, timeout: Duration) -> Self {
        self.between_bytes_timeout = Some(timeout);
        self
    }

    /// How long a domain may go unused before its worker retires it.
    pub fn domain_usage_timeout(mut self, timeout: Duration) -> Self {
        self.domain_usage_timeout = timeout;
        self
    }

    /// Maximum time `pick()` will wait on a cold domain's first resolve.
    pub fn first_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.first_lookup_timeout = timeout;
        self
    }

    /// Per-backend connection cap. `0` means unlimited.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// PROXY protocol version attached to acquired backends: `0` (off), `1`, or `2`.
    pub fn proxy_header(mut self, version: u8) -> Result<Self, ConfigError> {
        if version > 2 {
            return Err(ConfigError::InvalidProxyHeader(version));
        }
        self.proxy_header = version;
        Ok(self)
    }

    /// Which TTL source a domain's worker honours between resolves.
    pub fn ttl_from(mut self, ttl_from: TtlFrom) -> Self {
        self.ttl_from = ttl_from;
        self
    }

    /// Validate cross-cutting constraints that depend on the resolver a director is
    /// about to be built with (`ttl_from != cfg` requires a TTL-capable resolver).
    pub(crate) fn validate(&self, resolver_supports_ttl: bool) -> Result<(), ConfigError> {
        if self.ttl_from != TtlFrom::Cfg && !resolver_supports_ttl {
            return Err(ConfigError::TtlFromRequiresResolver);
        }
        Ok(())
    }
}

/// Resolve a symbolic or numeric port string to its numeric form, per the data model's
/// "ports may appear symbolically" rule.
pub fn resolve_port(raw: &str) -> Result<u16, ConfigError> {
    match raw {
        "http" => Ok(80),
        "https" => Ok(443),
        _ => raw
            .parse()
            .map_err(|_| ConfigError::InvalidPort(raw.to_string())),
    }
}
