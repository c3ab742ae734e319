//! Endpoint identity and backend sharing scope.

use std::net::IpAddr;
use std::sync::Arc;

/// Controls whether [`crate::registry::BackendRegistry`] deduplicates backends by
/// address+port alone, or by the full (host, address, port) triple.
///
/// `Director` scope lets two directors that resolve to the same address share one
/// backend object; `Host` scope keeps backends distinct per source hostname even when
/// they happen to resolve to the same address, which matters when the host header or
/// per-host probe identity must differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShareScope {
    /// Dedupe by (address, port); the hostname that produced an address is ignored.
    Director,
    /// Dedupe by the full (hostname, address, port) triple.
    Host,
}

impl Default for ShareScope {
    fn default() -> Self {
        Self::Director
    }
}

/// One resolved endpoint within a domain's address set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    /// The resolved network address.
    pub address: IpAddr,
    /// The resolved port.
    pub port: u16,
    /// Hostname the address was resolved from. Only significant under [`ShareScope::Host`].
    pub host: Option<Arc<str>>,
}

impl EndpointKey {
    /// Construct an endpoint key for a resolved address.
    pub fn new(address: IpAddr, port: u16, host: Option<Arc<str>>) -> Self {
        Self {
            address,
            port,
            host,
        }
    }

    /// Project this endpoint into the registry key appropriate for `scope`.
    pub fn registry_key(&self, scope: ShareScope) -> RegistryKey {
        match scope {
            ShareScope::Director => RegistryKey::Director {
                address: self.address,
                port: self.port,
            },
            ShareScope::Host => RegistryKey::Host {
                host: self
                    .host
                    .clone()
                    .unwrap_or_else(|| Arc::from(self.address.to_string())),
                address: self.address,
                port: self.port,
            },
        }
    }
}

/// The key a [`crate::registry::BackendRegistry`] deduplicates backend objects by.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegistryKey {
    /// Keyed by address and port alone ([`ShareScope::Director`]).
    Director {
        /// The resolved network address.
        address: IpAddr,
        /// The resolved port.
        port: u16,
    },
    /// Keyed by hostname, address, and port ([`ShareScope::Host`]).
    Host {
        /// The hostname the address was resolved from.
        host: Arc<str>,
        /// The resolved network address.
        address: IpAddr,
        /// The resolved port.
        port: u16,
    },
}

impl std::fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Director { address, port } => write!(f, "{address}:{port}"),
            Self::Host { host, address, port } => write!(f, "{host}({address}:{port})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn director_scope_ignores_host() {
        let a = EndpointKey::new("127.0.0.1".parse().unwrap(), 80, Some(Arc::from("a.test")));
        let b = EndpointKey::new("127.0.0.1".parse().unwrap(), 80, Some(Arc::from("b.test")));
        assert_eq!(
            a.registry_key(ShareScope::Director),
            b.registry_key(ShareScope::Director)
        );
    }

    #[test]
    fn host_scope_distinguishes_hostnames() {
        let a = EndpointKey::new("127.0.0.1".parse().unwrap(), 80, Some(Arc::from("a.test")));
        let b = EndpointKey::new("127.0.0.1".parse().unwrap(), 80, Some(Arc::from("b.test")));
        assert_ne!(
            a.registry_key(ShareScope::Host),
            b.registry_key(ShareScope::Host)
        );
    }
}
