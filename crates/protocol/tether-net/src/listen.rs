//! Accepting connections.

use crate::addr::{tcp_multiaddr, tcp_socket_addr};
use crate::config::DialConfig;
use crate::conn::{Conn, SecureConn, SingleConn};
use crate::error::{NetworkError, NetworkResult};
use crate::filter::AddrFilters;
use crate::negotiate;
use crate::transport::{BoxedConnection, TcpConnection};
use libp2p::identity::Keypair;
use libp2p::{Multiaddr, PeerId};
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// The accepting half of the connect sequence.
///
/// Answers the remote's proposal with the tag of the process policy, then
/// runs the inbound security handshake when encryption is enabled.
#[derive(Debug, Clone)]
pub struct InboundUpgrader {
    local_peer: PeerId,
    keypair: Option<Keypair>,
    config: Arc<DialConfig>,
}

impl InboundUpgrader {
    pub fn new(local_peer: PeerId, keypair: Option<Keypair>, config: Arc<DialConfig>) -> Self {
        Self {
            local_peer,
            keypair,
            config,
        }
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    /// Negotiate and, if required, secure an accepted raw connection.
    pub async fn upgrade(&self, mut raw: BoxedConnection) -> NetworkResult<Conn> {
        let keypair = match (&self.keypair, self.config.encrypt_connections) {
            (Some(keypair), true) => Some(keypair.clone()),
            (None, true) => return Err(NetworkError::MissingPrivateKey),
            (_, false) => None,
        };

        negotiate::with_deadline(
            self.config.negotiate_timeout,
            negotiate::handle_proto(self.config.security_tag(), &mut raw),
        )
        .await?;

        let conn = SingleConn::new(self.local_peer, None, raw);
        match keypair {
            Some(keypair) => Ok(Conn::Secure(SecureConn::inbound(keypair, conn).await?)),
            None => {
                warn!(remote = %conn.remote_multiaddr(), "accepted INSECURE connection");
                Ok(Conn::Insecure(conn))
            }
        }
    }
}

/// A TCP listener that yields upgraded connections.
///
/// Connections from addresses denied by its [`AddrFilters`] are closed as
/// soon as they are accepted and never handed out.
#[derive(Debug)]
pub struct Listener {
    inner: tokio::net::TcpListener,
    multiaddr: Multiaddr,
    upgrader: InboundUpgrader,
    filters: RwLock<AddrFilters>,
}

impl Listener {
    /// Bind to a `/ip4|ip6/<ip>/tcp/<port>` address; port 0 picks a free one.
    pub async fn bind(
        addr: &Multiaddr,
        local_peer: PeerId,
        keypair: Option<Keypair>,
        config: Arc<DialConfig>,
    ) -> NetworkResult<Self> {
        let sock = tcp_socket_addr(addr).ok_or_else(|| NetworkError::NoTransport(addr.clone()))?;
        let inner = tokio::net::TcpListener::bind(sock).await?;
        let multiaddr = tcp_multiaddr(inner.local_addr()?);
        debug!(%multiaddr, peer = %local_peer, "listening");

        Ok(Self {
            inner,
            multiaddr,
            upgrader: InboundUpgrader::new(local_peer, keypair, config),
            filters: RwLock::new(AddrFilters::new()),
        })
    }

    /// The bound address, with the actual port.
    pub fn multiaddr(&self) -> &Multiaddr {
        &self.multiaddr
    }

    pub fn local_peer(&self) -> PeerId {
        self.upgrader.local_peer()
    }

    /// Replace the address filters. Applies to every later accept.
    pub fn set_addr_filters(&self, filters: AddrFilters) {
        *self.filters.write().unwrap_or_else(PoisonError::into_inner) = filters;
    }

    pub fn addr_filters(&self) -> AddrFilters {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Accept the next raw connection from an allowed address, without
    /// upgrading it.
    pub async fn accept_raw(&self) -> io::Result<BoxedConnection> {
        loop {
            let (stream, remote) = self.inner.accept().await?;
            let remote = tcp_multiaddr(remote);
            let blocked = self
                .filters
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .addr_blocked(&remote);
            if blocked {
                // Dropping the stream closes it.
                debug!(%remote, "blocked connection");
                continue;
            }
            return Ok(Box::new(TcpConnection::new(stream)?));
        }
    }

    /// Accept and upgrade the next connection.
    pub async fn accept(&self) -> NetworkResult<Conn> {
        let raw = self.accept_raw().await?;
        self.upgrader.upgrade(raw).await
    }

    /// Stop listening and release the socket.
    pub fn close(self) {
        debug!(multiaddr = %self.multiaddr, "listener closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_blocked_remote_is_dropped() {
        let listener = Listener::bind(
            &"/ip4/127.0.0.1/tcp/0".parse().unwrap(),
            PeerId::random(),
            None,
            Arc::new(DialConfig::insecure()),
        )
        .await
        .unwrap();
        let loopback: ipnet::IpNet = "127.0.0.0/8".parse().unwrap();
        listener.set_addr_filters([loopback].into_iter().collect());
        assert!(!listener.addr_filters().is_empty());

        let sock = tcp_socket_addr(listener.multiaddr()).unwrap();
        let listener = Arc::new(listener);
        let accepting = listener.clone();
        let accept = tokio::spawn(async move { accepting.accept_raw().await });

        // The first client is closed without being handed out.
        let mut blocked = tokio::net::TcpStream::connect(sock).await.unwrap();
        let mut buf = [0u8; 1];
        let read = timeout(Duration::from_secs(5), blocked.read(&mut buf))
            .await
            .expect("blocked connection left open");
        assert!(matches!(read, Ok(0) | Err(_)));
        assert!(!accept.is_finished());

        listener.set_addr_filters(AddrFilters::new());
        let _allowed = tokio::net::TcpStream::connect(sock).await.unwrap();
        let raw = timeout(Duration::from_secs(5), accept)
            .await
            .expect("allowed connection not accepted")
            .unwrap()
            .unwrap();
        assert_eq!(
            raw.remote_multiaddr().iter().next(),
            Some(libp2p::multiaddr::Protocol::Ip4([127, 0, 0, 1].into()))
        );
    }
}
