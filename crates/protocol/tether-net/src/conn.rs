//! Established peer connections.
//!
//! A dial or accept first yields a [`SingleConn`]: the negotiated raw
//! stream plus peer and address metadata. Unless encryption is disabled it
//! is then consumed by a [`SecureConn`], which runs the noise handshake
//! over it and owns it from then on.

use crate::error::{NetworkError, NetworkResult};
use crate::negotiate::SECURE_CHANNEL_TAG;
use crate::peer::{public_key_from_peer_id, public_key_matches};
use crate::transport::BoxedConnection;
use futures::{AsyncRead, AsyncWrite, AsyncWriteExt};
use libp2p::core::upgrade::{InboundConnectionUpgrade, OutboundConnectionUpgrade};
use libp2p::identity::{Keypair, PublicKey};
use libp2p::{noise, Multiaddr, PeerId};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tracing::debug;

/// Identifier unique among the connections of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A negotiated but unencrypted connection.
pub struct SingleConn {
    id: ConnectionId,
    local_peer: PeerId,
    remote_peer: Option<PeerId>,
    local_addr: Multiaddr,
    remote_addr: Multiaddr,
    io: BoxedConnection,
}

impl SingleConn {
    /// Wrap a negotiated raw connection.
    ///
    /// `remote_peer` is `None` on the accepting side, where the remote
    /// identity is only learned from the security handshake.
    pub fn new(local_peer: PeerId, remote_peer: Option<PeerId>, io: BoxedConnection) -> Self {
        Self {
            id: ConnectionId::next(),
            local_peer,
            remote_peer,
            local_addr: io.local_multiaddr(),
            remote_addr: io.remote_multiaddr(),
            io,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn remote_peer(&self) -> Option<PeerId> {
        self.remote_peer
    }

    pub fn local_multiaddr(&self) -> &Multiaddr {
        &self.local_addr
    }

    pub fn remote_multiaddr(&self) -> &Multiaddr {
        &self.remote_addr
    }
}

impl fmt::Debug for SingleConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleConn")
            .field("id", &self.id)
            .field("local_peer", &self.local_peer)
            .field("remote_peer", &self.remote_peer)
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

/// An authenticated, encrypted connection.
///
/// The remote public key has been checked against the remote peer ID.
pub struct SecureConn {
    id: ConnectionId,
    local_peer: PeerId,
    remote_peer: PeerId,
    local_addr: Multiaddr,
    remote_addr: Multiaddr,
    local_key: Keypair,
    remote_key: PublicKey,
    io: noise::Output<BoxedConnection>,
}

impl SecureConn {
    /// Secure an outgoing connection, requiring the remote to be `expected`.
    ///
    /// The inner connection is closed on any failure.
    pub async fn outbound(
        local_key: Keypair,
        conn: SingleConn,
        expected: PeerId,
    ) -> NetworkResult<Self> {
        let SingleConn {
            id,
            local_peer,
            local_addr,
            remote_addr,
            io,
            ..
        } = conn;

        let config = noise_config(&local_key)?;
        let (remote_peer, mut output) = config
            .upgrade_outbound(io, SECURE_CHANNEL_TAG)
            .await
            .map_err(|e| NetworkError::SecurityUpgrade(e.to_string()))?;

        if remote_peer != expected {
            let _ = output.close().await;
            return Err(NetworkError::PeerIdMismatch {
                expected,
                actual: remote_peer,
            });
        }

        let remote_key = match verified_remote_key(&remote_peer) {
            Ok(key) => key,
            Err(e) => {
                let _ = output.close().await;
                return Err(e);
            }
        };

        debug!(%id, remote = %remote_peer, "secured outbound connection");
        Ok(Self {
            id,
            local_peer,
            remote_peer,
            local_addr,
            remote_addr,
            local_key,
            remote_key,
            io: output,
        })
    }

    /// Secure an accepted connection, learning the remote identity.
    pub async fn inbound(local_key: Keypair, conn: SingleConn) -> NetworkResult<Self> {
        let SingleConn {
            id,
            local_peer,
            local_addr,
            remote_addr,
            io,
            ..
        } = conn;

        let config = noise_config(&local_key)?;
        let (remote_peer, mut output) = config
            .upgrade_inbound(io, SECURE_CHANNEL_TAG)
            .await
            .map_err(|e| NetworkError::SecurityUpgrade(e.to_string()))?;

        let remote_key = match verified_remote_key(&remote_peer) {
            Ok(key) => key,
            Err(e) => {
                let _ = output.close().await;
                return Err(e);
            }
        };

        debug!(%id, remote = %remote_peer, "secured inbound connection");
        Ok(Self {
            id,
            local_peer,
            remote_peer,
            local_addr,
            remote_addr,
            local_key,
            remote_key,
            io: output,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn remote_peer(&self) -> PeerId {
        self.remote_peer
    }

    pub fn local_multiaddr(&self) -> &Multiaddr {
        &self.local_addr
    }

    pub fn remote_multiaddr(&self) -> &Multiaddr {
        &self.remote_addr
    }

    pub fn local_private_key(&self) -> &Keypair {
        &self.local_key
    }

    pub fn remote_public_key(&self) -> &PublicKey {
        &self.remote_key
    }
}

impl fmt::Debug for SecureConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureConn")
            .field("id", &self.id)
            .field("local_peer", &self.local_peer)
            .field("remote_peer", &self.remote_peer)
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

fn noise_config(local_key: &Keypair) -> NetworkResult<noise::Config> {
    noise::Config::new(local_key).map_err(|e| NetworkError::SecurityUpgrade(e.to_string()))
}

fn verified_remote_key(remote_peer: &PeerId) -> NetworkResult<PublicKey> {
    let key = public_key_from_peer_id(remote_peer).ok_or_else(|| {
        NetworkError::SecurityUpgrade(format!("cannot recover public key of {}", remote_peer))
    })?;
    if !public_key_matches(&key, remote_peer) {
        return Err(NetworkError::SecurityUpgrade(format!(
            "public key does not match {}",
            remote_peer
        )));
    }
    Ok(key)
}

/// A connection produced by a dial or an accept.
#[derive(Debug)]
pub enum Conn {
    /// Encryption is disabled process-wide.
    Insecure(SingleConn),
    Secure(SecureConn),
}

impl Conn {
    pub fn id(&self) -> ConnectionId {
        match self {
            Self::Insecure(c) => c.id(),
            Self::Secure(c) => c.id(),
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Secure(_))
    }

    pub fn local_peer(&self) -> PeerId {
        match self {
            Self::Insecure(c) => c.local_peer(),
            Self::Secure(c) => c.local_peer(),
        }
    }

    /// The remote peer, unknown only for accepted insecure connections.
    pub fn remote_peer(&self) -> Option<PeerId> {
        match self {
            Self::Insecure(c) => c.remote_peer(),
            Self::Secure(c) => Some(c.remote_peer()),
        }
    }

    pub fn local_multiaddr(&self) -> &Multiaddr {
        match self {
            Self::Insecure(c) => c.local_multiaddr(),
            Self::Secure(c) => c.local_multiaddr(),
        }
    }

    pub fn remote_multiaddr(&self) -> &Multiaddr {
        match self {
            Self::Insecure(c) => c.remote_multiaddr(),
            Self::Secure(c) => c.remote_multiaddr(),
        }
    }

    /// The local key, present only once secured.
    pub fn local_private_key(&self) -> Option<&Keypair> {
        match self {
            Self::Insecure(_) => None,
            Self::Secure(c) => Some(c.local_private_key()),
        }
    }

    /// The remote key, present only once secured.
    pub fn remote_public_key(&self) -> Option<&PublicKey> {
        match self {
            Self::Insecure(_) => None,
            Self::Secure(c) => Some(c.remote_public_key()),
        }
    }

    /// Close the connection, including the inner raw connection.
    pub async fn close(mut self) -> io::Result<()> {
        AsyncWriteExt::close(&mut self).await
    }
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Insecure(c) => Pin::new(&mut c.io).poll_read(cx, buf),
            Self::Secure(c) => Pin::new(&mut c.io).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Insecure(c) => Pin::new(&mut c.io).poll_write(cx, buf),
            Self::Secure(c) => Pin::new(&mut c.io).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Insecure(c) => Pin::new(&mut c.io).poll_flush(cx),
            Self::Secure(c) => Pin::new(&mut c.io).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Insecure(c) => Pin::new(&mut c.io).poll_close(cx),
            Self::Secure(c) => Pin::new(&mut c.io).poll_close(cx),
        }
    }
}
