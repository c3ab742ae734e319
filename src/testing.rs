//! A scriptable [`ResolverAdapter`] for tests, replacing the teacher's real-socket DNS
//! server + sandboxed integration harness (`tests/harness`, `tests/sandbox`) with a
//! deterministic in-memory stand-in: no root network namespace, no bound port 53, no
//! wire format, just queued responses. Gated behind `test-util` so the integration
//! suite under `tests/` can depend on it without pulling it into release builds.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ResolveFailure;
use crate::record::SrvRecord;
use crate::resolver::{AddressLookup, ResolverAdapter, SrvLookup};

/// An SRV record scripted into a [`FakeResolver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeSrvRecord {
    /// The record's target hostname.
    pub target: String,
    /// The target's port.
    pub port: u16,
    /// The record's priority; lower values are preferred.
    pub priority: u16,
    /// The record's weight, used to distribute load within a priority tier.
    pub weight: u16,
}

impl SrvRecord for FakeSrvRecord {
    type Target = str;

    fn target(&self) -> &Self::Target {
        &self.target
    }
    fn port(&self) -> u16 {
        self.port
    }
    fn priority(&self) -> u16 {
        self.priority
    }
    fn weight(&self) -> u16 {
        self.weight
    }
}

type AddressResult = Result<(Vec<IpAddr>, Option<Duration>), ResolveFailure>;
type SrvResult = Result<(Vec<FakeSrvRecord>, Option<Duration>), ResolveFailure>;

#[derive(Default)]
struct State {
    addresses: HashMap<String, VecDeque<AddressResult>>,
    default_address: Option<AddressResult>,
    srv: HashMap<String, VecDeque<SrvResult>>,
    default_srv: Option<SrvResult>,
}

/// A resolver whose responses are scripted by the test, one queue per (host or service)
/// name, falling back to an optionally-set default once a name's queue runs dry.
/// Unscripted names with no default fail with [`ResolveFailure`], mirroring a cold
/// domain that never sees a successful resolve.
pub struct FakeResolver {
    state: Mutex<State>,
    supports_srv: bool,
    supports_ttl: bool,
}

impl FakeResolver {
    /// Supports both SRV lookups and DNS-supplied TTLs, the shape of the recursive
    /// client.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            supports_srv: true,
            supports_ttl: true,
        }
    }

    /// Supports neither SRV lookups nor TTLs, the shape of the system resolver.
    pub fn system_like() -> Self {
        Self {
            state: Mutex::new(State::default()),
            supports_srv: false,
            supports_ttl: false,
        }
    }

    /// Queue one address response for `host`, consumed in FIFO order ahead of any
    /// default.
    pub fn push_addresses(&self, host: &str, addresses: Vec<IpAddr>, ttl: Option<Duration>) {
        self.state
            .lock()
            .unwrap()
            .addresses
            .entry(host.to_string())
            .or_default()
            .push_back(Ok((addresses, ttl)));
    }

    /// Queue a resolve failure for `host`.
    pub fn push_address_failure(&self, host: &str, failure: ResolveFailure) {
        self.state
            .lock()
            .unwrap()
            .addresses
            .entry(host.to_string())
            .or_default()
            .push_back(Err(failure));
    }

    /// Response repeated for any host whose own queue is empty (including hosts never
    /// mentioned by name), such as a constant stub backend used across many tests.
    pub fn set_default_addresses(&self, addresses: Vec<IpAddr>, ttl: Option<Duration>) {
        self.state.lock().unwrap().default_address = Some(Ok((addresses, ttl)));
    }

    /// Queue one SRV response for `name`.
    pub fn push_srv(&self, name: &str, records: Vec<FakeSrvRecord>, ttl: Option<Duration>) {
        self.state
            .lock()
            .unwrap()
            .srv
            .entry(name.to_string())
            .or_default()
            .push_back(Ok((records, ttl)));
    }

    /// Queue an SRV resolve failure for `name`.
    pub fn push_srv_failure(&self, name: &str, failure: ResolveFailure) {
        self.state
            .lock()
            .unwrap()
            .srv
            .entry(name.to_string())
            .or_default()
            .push_back(Err(failure));
    }

    /// SRV response repeated for any name whose own queue is empty.
    pub fn set_default_srv(&self, records: Vec<FakeSrvRecord>, ttl: Option<Duration>) {
        self.state.lock().unwrap().default_srv = Some(Ok((records, ttl)));
    }
}

impl Default for FakeResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolverAdapter for FakeResolver {
    type SrvRecord = FakeSrvRecord;

    async fn resolve_addresses(&self, host: &str) -> Result<AddressLookup, ResolveFailure> {
        let mut state = self.state.lock().unwrap();
        let queued = state.addresses.get_mut(host).and_then(VecDeque::pop_front);
        let result = queued
            .or_else(|| state.default_address.clone())
            .unwrap_or_else(|| Err(ResolveFailure::new(None, format!("no response scripted for {host}"))));
        result.map(|(addresses, ttl)| AddressLookup { addresses, ttl })
    }

    async fn resolve_srv(&self, name: &str) -> Result<SrvLookup<FakeSrvRecord>, ResolveFailure> {
        let mut state = self.state.lock().unwrap();
        let queued = state.srv.get_mut(name).and_then(VecDeque::pop_front);
        let result = queued
            .or_else(|| state.default_srv.clone())
            .unwrap_or_else(|| Err(ResolveFailure::new(None, format!("no SRV response scripted for {name}"))));
        result.map(|(records, ttl)| SrvLookup { records, ttl })
    }

    fn supports_srv(&self) -> bool {
        self.supports_srv
    }

    fn supports_ttl(&self) -> bool {
        self.supports_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_responses_are_consumed_in_order_then_default_takes_over() {
        let resolver = FakeResolver::new();
        resolver.push_addresses("a.test", vec!["127.0.0.1".parse().unwrap()], None);
        resolver.set_default_addresses(vec!["127.0.0.2".parse().unwrap()], None);

        let first = resolver.resolve_addresses("a.test").await.unwrap();
        assert_eq!(first.addresses, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);

        let second = resolver.resolve_addresses("a.test").await.unwrap();
        assert_eq!(second.addresses, vec!["127.0.0.2".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn unscripted_name_with_no_default_fails() {
        let resolver = FakeResolver::new();
        assert!(resolver.resolve_addresses("unknown.test").await.is_err());
    }
}
