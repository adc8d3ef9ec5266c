//! Peer identities and connect targets.

use libp2p::identity::PublicKey;
use libp2p::{Multiaddr, PeerId};

/// Multihash code of the identity hash, used for keys short enough to be
/// inlined into the peer ID.
const IDENTITY_MULTIHASH_CODE: u64 = 0x00;

/// A connect target: a peer and the addresses it might be reachable at.
///
/// The addresses are advisory until a connection to one of them succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addrs: Vec<Multiaddr>,
}

impl PeerInfo {
    pub fn new(id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { id, addrs }
    }

    /// A target with no known addresses.
    pub fn from_id(id: PeerId) -> Self {
        Self {
            id,
            addrs: Vec::new(),
        }
    }
}

impl From<PeerId> for PeerInfo {
    fn from(id: PeerId) -> Self {
        Self::from_id(id)
    }
}

/// Recover the public key inlined into `peer`.
///
/// Returns `None` for peer IDs that carry only a hash of the key.
pub fn public_key_from_peer_id(peer: &PeerId) -> Option<PublicKey> {
    let multihash = peer.as_ref();
    if multihash.code() != IDENTITY_MULTIHASH_CODE {
        return None;
    }
    PublicKey::try_decode_protobuf(multihash.digest()).ok()
}

/// Returns true if `key` is the key `peer` was derived from.
pub fn public_key_matches(key: &PublicKey, peer: &PeerId) -> bool {
    key.to_peer_id() == *peer
}
