//! Address allow-listing applied by a domain's reconciliation step before acquiring a
//! candidate address through the backend registry.

use std::net::IpAddr;

/// Evaluates whether a resolved address may be acquired as a backend.
pub trait Whitelist: Send + Sync {
    /// Whether `address` may be acquired as a backend.
    fn allows(&self, address: IpAddr) -> bool;
}

/// A whitelist built from an explicit set of allowed networks, grounded on the simple
/// CIDR containment checks used throughout the pack's routing/director examples.
#[derive(Clone, Debug)]
pub struct CidrWhitelist {
    networks: Vec<(IpAddr, u8)>,
}

impl CidrWhitelist {
    /// Build a whitelist from `(network, prefix length)` pairs; an address is allowed if
    /// it falls within any of them.
    pub fn new(networks: Vec<(IpAddr, u8)>) -> Self {
        Self { networks }
    }

    fn contains(network: IpAddr, prefix: u8, address: IpAddr) -> bool {
        match (network, address) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = if prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - prefix.min(32))
                };
                (u32::from(net) & mask) == (u32::from(addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = if prefix == 0 {
                    0
                } else {
                    u128::MAX << (128 - prefix.min(128))
                };
                (u128::from(net) & mask) == (u128::from(addr) & mask)
            }
            _ => false,
        }
    }
}

impl Whitelist for CidrWhitelist {
    fn allows(&self, address: IpAddr) -> bool {
        self.networks
            .iter()
            .any(|&(net, prefix)| Self::contains(net, prefix, address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_address_outside_network() {
        let acl = CidrWhitelist::new(vec![("127.0.0.1".parse().unwrap(), 32)]);
        assert!(acl.allows("127.0.0.1".parse().unwrap()));
        assert!(!acl.allows("::1".parse().unwrap()));
    }

    #[test]
    fn prefix_zero_allows_everything() {
        let acl = CidrWhitelist::new(vec![("0.0.0.0".parse().unwrap(), 0)]);
        assert!(acl.allows("203.0.113.7".parse().unwrap()));
    }
}
