//! Address filters for accepted connections.

use ipnet::IpNet;
use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use std::net::IpAddr;

/// A deny list of IP networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddrFilters {
    deny: Vec<IpNet>,
}

impl AddrFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny every address inside `net`.
    pub fn add_deny(&mut self, net: IpNet) {
        if !self.deny.contains(&net) {
            self.deny.push(net);
        }
    }

    /// Stop denying `net`. Returns false if it was not denied.
    pub fn remove_deny(&mut self, net: &IpNet) -> bool {
        let before = self.deny.len();
        self.deny.retain(|n| n != net);
        self.deny.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.deny.is_empty()
    }

    /// Whether the leading IP of `addr` falls inside a denied network.
    ///
    /// Addresses that do not start with an IP segment are never blocked.
    pub fn addr_blocked(&self, addr: &Multiaddr) -> bool {
        let ip: IpAddr = match addr.iter().next() {
            Some(Protocol::Ip4(ip)) => ip.into(),
            Some(Protocol::Ip6(ip)) => ip.into(),
            _ => return false,
        };
        self.deny.iter().any(|net| net.contains(&ip))
    }
}

impl FromIterator<IpNet> for AddrFilters {
    fn from_iter<I: IntoIterator<Item = IpNet>>(iter: I) -> Self {
        let mut filters = Self::new();
        for net in iter {
            filters.add_deny(net);
        }
        filters
    }
}
