//! Peer address book.
//!
//! Addresses are stored per peer with a time-to-live. An address whose TTL
//! has elapsed is no longer returned and is dropped on the next write.

use libp2p::{Multiaddr, PeerId};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use ttl_cache::TtlCache;

/// TTL for addresses learned while trying to connect.
pub const TEMP_ADDR_TTL: Duration = Duration::from_secs(10);

/// TTL for addresses learned from a routing provider.
pub const PROVIDER_ADDR_TTL: Duration = Duration::from_secs(10 * 60);

/// TTL for addresses that never expire.
pub const PERMANENT_ADDR_TTL: Duration = Duration::MAX;

/// Longest TTL handed to the cache; anything longer is stored as this.
const MAX_STORED_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Default number of addresses a [`MemoryPeerstore`] holds.
pub const DEFAULT_PEERSTORE_CAPACITY: usize = 4096;

/// Address storage keyed by peer.
pub trait Peerstore: Send + Sync {
    /// Record `addrs` for `peer`, valid for `ttl`.
    ///
    /// Re-adding a known address keeps whichever expiry is later. A zero TTL
    /// removes the address.
    fn add_addrs(&self, peer: &PeerId, addrs: &[Multiaddr], ttl: Duration);

    /// Unexpired addresses for `peer`, least recently refreshed first.
    fn addrs(&self, peer: &PeerId) -> Vec<Multiaddr>;

    /// Forget every address of `peer`.
    fn clear_addrs(&self, peer: &PeerId);

    /// Peers with at least one unexpired address.
    fn peers(&self) -> Vec<PeerId>;
}

/// In-memory [`Peerstore`].
///
/// Each `(peer, address)` pair is one cache entry whose value is its
/// deadline. When full, the least recently refreshed entry is evicted.
pub struct MemoryPeerstore {
    book: Mutex<TtlCache<(PeerId, Multiaddr), Instant>>,
}

impl Default for MemoryPeerstore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PEERSTORE_CAPACITY)
    }
}

impl MemoryPeerstore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A peerstore holding at most `capacity` addresses across all peers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            book: Mutex::new(TtlCache::new(capacity)),
        }
    }

    fn book(&self) -> MutexGuard<'_, TtlCache<(PeerId, Multiaddr), Instant>> {
        // The cache stays consistent across a panicking holder.
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MemoryPeerstore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPeerstore")
            .field("capacity", &self.book().capacity())
            .finish()
    }
}

impl Peerstore for MemoryPeerstore {
    fn add_addrs(&self, peer: &PeerId, addrs: &[Multiaddr], ttl: Duration) {
        let ttl = ttl.min(MAX_STORED_TTL);
        let now = Instant::now();
        let expires = now + ttl;

        let mut book = self.book();
        for addr in addrs {
            let key = (*peer, addr.clone());
            if ttl.is_zero() {
                book.remove(&key);
                continue;
            }
            let known = book.get(&key).copied().filter(|t| *t > now);
            if known.map_or(true, |t| t < expires) {
                book.insert(key, expires, ttl);
            }
        }
    }

    fn addrs(&self, peer: &PeerId) -> Vec<Multiaddr> {
        let now = Instant::now();
        let mut book = self.book();
        let mut addrs = Vec::new();
        for ((p, addr), expires) in book.iter() {
            if p == peer && *expires > now {
                addrs.push(addr.clone());
            }
        }
        addrs
    }

    fn clear_addrs(&self, peer: &PeerId) {
        let mut book = self.book();
        let keys: Vec<(PeerId, Multiaddr)> = book
            .iter()
            .map(|(key, _)| key)
            .filter(|(p, _)| p == peer)
            .cloned()
            .collect();
        for key in keys {
            book.remove(&key);
        }
    }

    fn peers(&self) -> Vec<PeerId> {
        let now = Instant::now();
        let mut book = self.book();
        let mut peers = Vec::new();
        for ((p, _), expires) in book.iter() {
            if *expires > now && !peers.contains(p) {
                peers.push(*p);
            }
        }
        peers
    }
}
