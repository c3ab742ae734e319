#![deny(missing_docs)]
#![warn(broken_intra_doc_links)]

/*!
A backend director that resolves its members from DNS instead of a static list.

# Introduction

A [`Director`] stands in for a VCL `backend {}` block or a static `director {}`: instead
of a fixed address, each member is discovered by looking up a hostname (`.backend()`) or
a DNS SRV record (`.service()`). A background worker thread per (host, port) or per
service name keeps its membership current, re-resolving on a TTL and reconciling the
result against a shared [`BackendRegistry`] so that backends already in use keep their
identity — and their probe state and connection pools — across a re-resolve that returns
the same set.

```
use std::sync::Arc;
use std::time::Duration;

use dynamic_backend::config::DirectorConfig;
use dynamic_backend::registry::BackendRegistry;
use dynamic_backend::Director;
use dynamic_backend::resolver::recursive::RecursiveResolverConfig;
use dynamic_backend::stats::NullStats;

let resolver = RecursiveResolverConfig::new().build()?;
let director = Director::new(
    "example",
    DirectorConfig::new().ttl(Duration::from_secs(30)),
    Arc::new(resolver),
    BackendRegistry::new(Arc::new(NullStats)),
)?;
let backend = director.backend(Some("example.com"), Some("80"), None)?;
# Ok::<(), Box<dyn std::error::Error>>(())
```

# Resolvers

A director is generic over a [`resolver::ResolverAdapter`], selected at construction:

- `libresolv` (via [`resolver::system::SystemResolver`]): the operating system's
  synchronous resolver. No SRV support, no DNS TTL — `ttl_from` must stay at its default
  ([`config::TtlFrom::Cfg`]).
- `hickory` (via [`resolver::recursive::RecursiveResolver`], enabled by default):
  an asynchronous recursive client with SRV and TTL support, used for `.service()` and
  for `ttl_from` settings other than `Cfg`.

# Non-goals

This crate does not parse or generate wire-format DNS messages itself (that's the
resolver backends' job), does not implement HTTP or any other application protocol atop
a selected backend, and does not manage connection pools or TLS — it hands back a
[`registry::BackendRef`] identifying a resolved endpoint and leaves what to do with it to
the host environment.
*/

mod worker;

/// Address allow-listing applied before a resolved address is acquired as a backend.
pub mod acl;
/// Director configuration surface.
pub mod config;
mod director;
mod domain;
/// Error taxonomy.
pub mod error;
/// Structured logging of domain lifecycle events.
pub mod events;
/// Endpoint identity and backend sharing scope.
pub mod key;
/// Health probing interface.
pub mod probe;
/// SRV record ordering.
pub mod record;
/// The shared, refcounted map from endpoint key to backend object.
pub mod registry;
/// Resolver adapters: the system resolver and the recursive DNS client.
pub mod resolver;
mod service;
/// Host statistics registration.
pub mod stats;

/// A scriptable resolver adapter for tests.
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{DirectorConfig, TtlFrom};
pub use director::Director;
pub use domain::{Domain, DomainPhase};
pub use error::{ConfigError, DynamicError, ResolveFailure};
pub use key::{EndpointKey, RegistryKey, ShareScope};
pub use record::SrvRecord;
pub use registry::{BackendAttrs, BackendObject, BackendRef, BackendRegistry};
pub use service::ServiceDomain;
