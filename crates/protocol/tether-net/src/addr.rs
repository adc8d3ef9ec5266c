//! Multiaddr helpers and local address selection.

use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use rand::seq::SliceRandom;
use rand::Rng;
use std::mem;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// Network class of an address, taken from its leading segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrClass {
    Loopback,
    LinkLocal,
    Global,
}

impl AddrClass {
    /// Classify `addr` by its first segment.
    ///
    /// Only IPv6 `fe80::/10` counts as link-local. Non-IP leading segments
    /// (DNS names, memory ports) are treated as global.
    pub fn of(addr: &Multiaddr) -> Self {
        match addr.iter().next() {
            Some(Protocol::Ip4(ip)) if ip.is_loopback() => Self::Loopback,
            Some(Protocol::Ip6(ip)) if ip.is_loopback() => Self::Loopback,
            Some(Protocol::Ip6(ip)) if is_ip6_link_local(&ip) => Self::LinkLocal,
            _ => Self::Global,
        }
    }
}

fn is_ip6_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// Returns true if `addr` starts with a wildcard host (`0.0.0.0` or `::`).
pub fn is_unspecified(addr: &Multiaddr) -> bool {
    match addr.iter().next() {
        Some(Protocol::Ip4(ip)) => ip.is_unspecified(),
        Some(Protocol::Ip6(ip)) => ip.is_unspecified(),
        _ => false,
    }
}

/// Returns whether two multiaddrs have the same protocol stack.
///
/// Only the protocol codes are compared, never the values.
pub fn protocols_match(a: &Multiaddr, b: &Multiaddr) -> bool {
    let (mut a, mut b) = (a.iter(), b.iter());
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if mem::discriminant(&x) == mem::discriminant(&y) => {}
            _ => return false,
        }
    }
}

/// Returns the first candidate whose protocol stack matches `target`.
pub fn net_match<'a>(target: &Multiaddr, candidates: &'a [Multiaddr]) -> Option<&'a Multiaddr> {
    candidates.iter().find(|a| protocols_match(target, a))
}

/// Returns every candidate whose protocol stack matches `target`.
pub fn addr_match<'a>(target: &Multiaddr, candidates: &'a [Multiaddr]) -> Vec<&'a Multiaddr> {
    candidates
        .iter()
        .filter(|a| protocols_match(target, a))
        .collect()
}

/// Pick a local address usable to reach `remote`.
///
/// Candidates must share the remote's protocol stack. Loopback candidates
/// are kept only for loopback remotes and link-local candidates only for
/// link-local remotes; global candidates are always eligible. The result
/// is drawn at random from the survivors.
pub fn select_local_addr<R>(candidates: &[Multiaddr], remote: &Multiaddr, rng: &mut R) -> Option<Multiaddr>
where
    R: Rng + ?Sized,
{
    if candidates.is_empty() {
        return None;
    }

    let matching = addr_match(remote, candidates);
    if matching.is_empty() {
        return None;
    }

    let remote_class = AddrClass::of(remote);
    let usable: Vec<&Multiaddr> = matching
        .into_iter()
        .filter(|a| match AddrClass::of(a) {
            AddrClass::Loopback => remote_class == AddrClass::Loopback,
            AddrClass::LinkLocal => remote_class == AddrClass::LinkLocal,
            AddrClass::Global => true,
        })
        .collect();

    usable.choose(rng).map(|a| (*a).clone())
}

/// Convert `/ip4|ip6/<ip>/tcp/<port>` into a socket address.
pub fn tcp_socket_addr(addr: &Multiaddr) -> Option<SocketAddr> {
    let mut iter = addr.iter();
    let ip: IpAddr = match iter.next()? {
        Protocol::Ip4(ip) => ip.into(),
        Protocol::Ip6(ip) => ip.into(),
        _ => return None,
    };
    let port = match iter.next()? {
        Protocol::Tcp(port) => port,
        _ => return None,
    };
    if iter.next().is_some() {
        return None;
    }
    Some(SocketAddr::new(ip, port))
}

/// Convert a socket address into `/ip4|ip6/<ip>/tcp/<port>`.
pub fn tcp_multiaddr(addr: SocketAddr) -> Multiaddr {
    Multiaddr::empty()
        .with(Protocol::from(addr.ip()))
        .with(Protocol::Tcp(addr.port()))
}
