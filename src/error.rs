//! Error taxonomy.
//!
//! Mirrors the kinds called out in the error handling design: a configuration error is
//! fatal to director construction, everything else is surfaced through [`DynamicError`]
//! from [`crate::domain::Domain::pick`] or [`crate::director::Director::backend`].

use thiserror::Error;

/// Failure constructing a [`crate::config::DirectorConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `ttl_from` was set to something other than `cfg` on a resolver that cannot
    /// supply a DNS TTL.
    #[error("ttl_from requires a resolver capable of supplying a DNS TTL")]
    TtlFromRequiresResolver,
    /// `proxy_header` was set outside `{0, 1, 2}`.
    #[error("unsupported PROXY protocol version {0}")]
    InvalidProxyHeader(u8),
    /// A port string was neither numeric nor a recognised symbolic name.
    #[error("invalid port `{0}`")]
    InvalidPort(String),
    /// The recursive resolver's context pool failed to build.
    #[error("failed to initialize recursive resolver: {0}")]
    ResolverInitFailed(String),
    /// `outstanding_queries` was set to zero.
    #[error("outstanding_queries must be at least 1")]
    InvalidOutstandingQueries,
}

/// A resolve call failed. Carries the resolver-native code when one is available so
/// callers can distinguish e.g. NXDOMAIN from a transient server failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ResolveFailure {
    /// The resolver-native numeric code, when the backend can supply one.
    pub code: Option<i32>,
    /// Human-readable failure reason.
    pub reason: String,
}

impl ResolveFailure {
    /// Construct a resolve failure with an optional resolver-native code.
    pub fn new(code: Option<i32>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Failure returned to a caller of `.backend()` / `.service()` / `Domain::pick()`.
#[derive(Debug, Error)]
pub enum DynamicError {
    /// Construction-time configuration error surfaced through a fallible setter.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A resolve call failed and there was no prior Address Set to fall back to.
    #[error("resolve failed: {0}")]
    Resolver(#[from] ResolveFailure),
    /// `first_lookup_timeout` elapsed before the first successful resolve.
    #[error("no successful resolve before first_lookup_timeout elapsed")]
    ColdTimeout,
    /// A resolve succeeded but no address survived whitelist filtering (or none were
    /// returned), and there was no prior Address Set to fall back to.
    #[error("resolve returned no usable addresses before first_lookup_timeout elapsed")]
    EmptyAddressSet,
    /// The Address Set is non-empty but no member is currently eligible.
    #[error("no healthy backend available")]
    NoHealthyBackend,
    /// `.service()` was called on a director built without an SRV-capable resolver.
    #[error("`.service()` requires a resolver capable of SRV lookups")]
    UnsupportedOperation,
    /// `.backend()` was called with an empty host and no request `Host` header.
    #[error("empty `.backend()` host and no request Host header to fall back to")]
    MissingHost,
    /// A caller-supplied argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}
