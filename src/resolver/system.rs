//! The system resolver: synchronous, address-only, no TTL, no SRV support.
//!
//! Generalizes the teacher's `libresolv`-backed `SrvResolver` impl (`resolv::Resolver`,
//! a per-thread instance because `libresolv`'s `res_state` is not thread-safe) from
//! SRV-only lookups to plain A/AAAA address resolution, since a [`crate::domain::Domain`]
//! primarily resolves a host rather than a service name. This variant never answers SRV
//! queries — calling `.service()` on a director built over it fails at the call site
//! with [`crate::error::DynamicError::UnsupportedOperation`].

use std::cell::RefCell;
use std::net::IpAddr;

use async_trait::async_trait;
use resolv::Resolver;

use crate::error::ResolveFailure;
use crate::record::SrvRecord;
use crate::resolver::{AddressLookup, ResolverAdapter};

// Per-thread libresolv resolver state, mirroring the teacher's SRV resolver: libresolv's
// res_state holds raw, self-referential pointers and its traditional interface is not
// thread-safe, so each thread gets its own instance.
thread_local!(static RESOLVER: RefCell<Resolver> =
    RefCell::new(Resolver::new().expect("unable to initialize libresolv state"))
);

/// Recovers the resolver-native numeric code carried by a `resolv` crate error, the
/// same `res_h_errno`-shaped code the raw libresolv FFI layer exposes, by walking the
/// error's source chain down to the underlying OS error.
fn resolver_code(err: &resolv::error::Error) -> Option<i32> {
    let mut source: Option<&dyn std::error::Error> = std::error::Error::source(err);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return io_err.raw_os_error();
        }
        source = err.source();
    }
    None
}

/// Resolves hosts via the operating system's `libresolv` bindings.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

/// An SRV record type this resolver never produces; present only to satisfy
/// [`ResolverAdapter::SrvRecord`]'s bound, since [`SystemResolver::resolve_srv`] always
/// returns an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoSrvRecord(std::convert::Infallible);

impl SrvRecord for NoSrvRecord {
    type Target = str;

    fn target(&self) -> &Self::Target {
        match self.0 {}
    }
    fn port(&self) -> u16 {
        match self.0 {}
    }
    fn priority(&self) -> u16 {
        match self.0 {}
    }
    fn weight(&self) -> u16 {
        match self.0 {}
    }
}

#[async_trait]
impl ResolverAdapter for SystemResolver {
    type SrvRecord = NoSrvRecord;

    async fn resolve_addresses(&self, host: &str) -> Result<AddressLookup, ResolveFailure> {
        RESOLVER.with(|resolver| {
            let mut resolver = resolver.borrow_mut();
            let mut addresses = Vec::new();

            match resolver.search(host.as_bytes(), resolv::Class::IN, resolv::RecordType::A) {
                Ok(mut response) => {
                    addresses.extend(
                        response
                            .answers::<resolv::record::A>()
                            .map(|r| IpAddr::V4(r.data.address)),
                    );
                }
                Err(err) => {
                    // A-only failure is tolerated as long as AAAA succeeds below; only
                    // surfaced if both queries fail.
                    if let Ok(mut response) =
                        resolver.search(host.as_bytes(), resolv::Class::IN, resolv::RecordType::AAAA)
                    {
                        addresses.extend(
                            response
                                .answers::<resolv::record::AAAA>()
                                .map(|r| IpAddr::V6(r.data.address)),
                        );
                        if addresses.is_empty() {
                            return Err(ResolveFailure::new(resolver_code(&err), err.to_string()));
                        }
                        return Ok(AddressLookup { addresses, ttl: None });
                    }
                    return Err(ResolveFailure::new(resolver_code(&err), err.to_string()));
                }
            }

            if let Ok(mut response) =
                resolver.search(host.as_bytes(), resolv::Class::IN, resolv::RecordType::AAAA)
            {
                addresses.extend(
                    response
                        .answers::<resolv::record::AAAA>()
                        .map(|r| IpAddr::V6(r.data.address)),
                );
            }

            Ok(AddressLookup { addresses, ttl: None })
        })
    }

    fn supports_srv(&self) -> bool {
        false
    }

    fn supports_ttl(&self) -> bool {
        false
    }
}
