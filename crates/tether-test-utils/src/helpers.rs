//! Helper functions for creating test fixtures.
//!
//! Provides convenience functions for generating identities, addresses
//! and connected dialer/listener pairs, plus tracing set-up.

use libp2p::identity::Keypair;
use libp2p::{Multiaddr, PeerId};
use std::sync::Arc;
use tether_net::{DialConfig, Dialer, InboundUpgrader};
use tracing_subscriber::EnvFilter;

use crate::MemoryHub;

/// Install a tracing subscriber for tests, honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Generate a fresh ed25519 identity.
pub fn test_keypair() -> (Keypair, PeerId) {
    let keypair = Keypair::generate_ed25519();
    let peer = keypair.public().to_peer_id();
    (keypair, peer)
}

/// Deterministic ed25519 identity derived from `seed`.
pub fn seeded_keypair(seed: u8) -> (Keypair, PeerId) {
    // Any 32 bytes form a valid ed25519 secret.
    let keypair = Keypair::ed25519_from_bytes([seed; 32]).unwrap();
    let peer = keypair.public().to_peer_id();
    (keypair, peer)
}

/// Parse a multiaddr literal.
pub fn ma(s: &str) -> Multiaddr {
    s.parse().unwrap()
}

/// `/ip4/127.0.0.1/tcp/<port>`.
pub fn loopback_tcp(port: u16) -> Multiaddr {
    ma(&format!("/ip4/127.0.0.1/tcp/{}", port))
}

/// A dialer and an inbound upgrader sharing `config`, both with fresh
/// identities, where the dialer reaches `hub` listeners.
pub fn memory_pair(hub: &MemoryHub, config: DialConfig) -> (Dialer, InboundUpgrader) {
    let config = Arc::new(config);
    let (dial_key, _) = test_keypair();
    let (listen_key, listen_peer) = test_keypair();

    let mut dialer = Dialer::with_keypair(dial_key, config.clone());
    dialer.add_dialer(Arc::new(hub.dialer()));

    let upgrader = InboundUpgrader::new(listen_peer, Some(listen_key), config);
    (dialer, upgrader)
}
