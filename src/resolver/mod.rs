//! Uniform view over the system resolver and the recursive DNS client.
//!
//! Both variants implement [`ResolverAdapter`]; a [`crate::domain::Domain`] is generic
//! over the adapter in use, the same way the teacher's `SrvClient` is generic over its
//! `Resolver` type parameter. This generalizes the teacher's SRV-only `SrvResolver`
//! trait to also answer plain address lookups, since a domain resolves a host, not just
//! a service name.

/// The operating system's synchronous resolver.
#[cfg(feature = "libresolv")]
pub mod system;

/// The asynchronous recursive DNS client.
#[cfg(feature = "hickory")]
pub mod recursive;

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::ResolveFailure;
use crate::record::SrvRecord;

/// Result of resolving a host to a set of addresses.
#[derive(Clone, Debug)]
pub struct AddressLookup {
    /// The resolved addresses, duplicates removed.
    pub addresses: Vec<IpAddr>,
    /// Present only when the underlying resolver can supply one (the recursive client;
    /// never the system resolver).
    pub ttl: Option<Duration>,
}

/// Result of resolving a service name to a set of SRV records.
#[derive(Clone, Debug)]
pub struct SrvLookup<R> {
    /// The resolved SRV records.
    pub records: Vec<R>,
    /// Present only when the underlying resolver can supply one.
    pub ttl: Option<Duration>,
}

/// A name resolution backend: either the synchronous system resolver or the
/// asynchronous recursive DNS client.
#[async_trait]
pub trait ResolverAdapter: Send + Sync {
    /// The SRV record type this adapter resolves to.
    type SrvRecord: SrvRecord + Send + Sync + Clone;

    /// Resolve `host` to its A/AAAA addresses.
    async fn resolve_addresses(&self, host: &str) -> Result<AddressLookup, ResolveFailure>;

    /// Resolve `name` to its SRV records. The default implementation reports
    /// unsupported; only resolvers capable of SRV lookups override it.
    async fn resolve_srv(&self, name: &str) -> Result<SrvLookup<Self::SrvRecord>, ResolveFailure> {
        let _ = name;
        Err(ResolveFailure::new(
            None,
            "this resolver does not support SRV lookups",
        ))
    }

    /// Whether [`Self::resolve_srv`] is meaningfully implemented.
    fn supports_srv(&self) -> bool {
        false
    }

    /// Whether [`Self::resolve_addresses`] and [`Self::resolve_srv`] can supply a TTL
    /// from the DNS response, as opposed to always returning `None`.
    fn supports_ttl(&self) -> bool {
        false
    }
}

/// Sort SRV records into RFC 2782 selection order in place (ascending priority,
/// weighted-random within a tier). Lifted out of the teacher's per-resolver
/// `order_srv_records` and made resolver-agnostic.
pub fn order_srv_records<R: SrvRecord>(records: &mut [R], mut rng: impl Rng) {
    records.sort_by_cached_key(|record| record.sort_key(&mut rng));
}
