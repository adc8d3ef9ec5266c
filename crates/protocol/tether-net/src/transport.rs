//! Sub-transports for the dialer.
//!
//! A sub-dialer knows how to open a raw byte stream to some family of
//! addresses. The dialer keeps them in a [`TransportRegistry`] and picks the
//! first one whose [`SubDialer::matches`] accepts the target, falling back
//! to a single fallback dialer (plain TCP by default).

use crate::addr::{select_local_addr, tcp_multiaddr, tcp_socket_addr};
use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};
use libp2p::Multiaddr;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::{TcpSocket, TcpStream};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::debug;

/// A raw, unauthenticated bidirectional byte stream.
pub trait RawConnection: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Local address of the connection.
    fn local_multiaddr(&self) -> Multiaddr;

    /// Remote address of the connection.
    fn remote_multiaddr(&self) -> Multiaddr;
}

/// An owned raw connection of any transport.
pub type BoxedConnection = Box<dyn RawConnection>;

/// Hook applied to every raw connection right after it is established.
pub type WrapFn = Arc<dyn Fn(BoxedConnection) -> BoxedConnection + Send + Sync>;

/// A transport-specific connector.
#[async_trait]
pub trait SubDialer: Send + Sync {
    /// Whether this dialer knows how to dial `addr`.
    fn matches(&self, addr: &Multiaddr) -> bool;

    /// Open a raw connection to `addr`.
    async fn dial(&self, addr: &Multiaddr) -> io::Result<BoxedConnection>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Ordered sub-dialers plus a fallback.
///
/// Registration is append-only and needs `&mut self`: finish registering
/// before sharing the registry between concurrent dials.
pub struct TransportRegistry {
    dialers: Vec<Arc<dyn SubDialer>>,
    fallback: Arc<dyn SubDialer>,
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_fallback(Arc::new(TcpDialer::new()))
    }
}

impl TransportRegistry {
    /// A registry with the default TCP fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a custom fallback dialer.
    pub fn with_fallback(fallback: Arc<dyn SubDialer>) -> Self {
        Self {
            dialers: Vec::new(),
            fallback,
        }
    }

    /// Append a sub-dialer. Earlier registrations take precedence.
    pub fn add(&mut self, dialer: Arc<dyn SubDialer>) {
        self.dialers.push(dialer);
    }

    /// Number of registered sub-dialers, not counting the fallback.
    pub fn len(&self) -> usize {
        self.dialers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialers.is_empty()
    }

    /// The dialer to use for `addr`, if any.
    pub fn select(&self, addr: &Multiaddr) -> Option<Arc<dyn SubDialer>> {
        if let Some(dialer) = self.dialers.iter().find(|d| d.matches(addr)) {
            return Some(dialer.clone());
        }
        if self.fallback.matches(addr) {
            return Some(self.fallback.clone());
        }
        None
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field(
                "dialers",
                &self.dialers.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

/// A TCP connection with its multiaddrs.
#[derive(Debug)]
pub struct TcpConnection {
    stream: Compat<TcpStream>,
    local: Multiaddr,
    remote: Multiaddr,
}

impl TcpConnection {
    /// Wrap a connected stream, enabling `TCP_NODELAY` for low latency.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let local = tcp_multiaddr(stream.local_addr()?);
        let remote = tcp_multiaddr(stream.peer_addr()?);
        Ok(Self {
            stream: stream.compat(),
            local,
            remote,
        })
    }
}

impl RawConnection for TcpConnection {
    fn local_multiaddr(&self) -> Multiaddr {
        self.local.clone()
    }

    fn remote_multiaddr(&self) -> Multiaddr {
        self.remote.clone()
    }
}

impl AsyncRead for TcpConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_close(cx)
    }
}

/// Dials `/ip4|ip6/<ip>/tcp/<port>` addresses.
#[derive(Debug, Default, Clone)]
pub struct TcpDialer {
    local_addrs: Vec<Multiaddr>,
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind outgoing sockets to one of these addresses when one is usable
    /// for the target. Only the IP is used; the source port is ephemeral.
    pub fn with_local_addrs(mut self, addrs: Vec<Multiaddr>) -> Self {
        self.local_addrs = addrs;
        self
    }

    fn local_bind_addr(&self, remote: &Multiaddr) -> Option<SocketAddr> {
        let local = select_local_addr(&self.local_addrs, remote, &mut rand::thread_rng())?;
        tcp_socket_addr(&local).map(|sock| SocketAddr::new(sock.ip(), 0))
    }
}

#[async_trait]
impl SubDialer for TcpDialer {
    fn matches(&self, addr: &Multiaddr) -> bool {
        tcp_socket_addr(addr).is_some()
    }

    async fn dial(&self, addr: &Multiaddr) -> io::Result<BoxedConnection> {
        let remote = tcp_socket_addr(addr).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a TCP address: {}", addr),
            )
        })?;

        let stream = match self.local_bind_addr(addr) {
            Some(local) => {
                debug!(%local, %remote, "binding outgoing TCP socket");
                let socket = if remote.is_ipv4() {
                    TcpSocket::new_v4()?
                } else {
                    TcpSocket::new_v6()?
                };
                socket.bind(local)?;
                socket.connect(remote).await?
            }
            None => TcpStream::connect(remote).await?,
        };

        Ok(Box::new(TcpConnection::new(stream)?))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    struct StubDialer {
        name: &'static str,
        prefix: &'static str,
        dials: AtomicUsize,
    }

    impl StubDialer {
        fn new(name: &'static str, prefix: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                prefix,
                dials: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SubDialer for StubDialer {
        fn matches(&self, addr: &Multiaddr) -> bool {
            addr.to_string().starts_with(self.prefix)
        }

        async fn dial(&self, _addr: &Multiaddr) -> io::Result<BoxedConnection> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn ma(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_matching_dialer_wins() {
        let mut registry = TransportRegistry::with_fallback(StubDialer::new("fallback", "/dns4"));
        registry.add(StubDialer::new("ip4-a", "/ip4"));
        registry.add(StubDialer::new("ip4-b", "/ip4"));
        registry.add(StubDialer::new("memory", "/memory"));
        assert_eq!(registry.len(), 3);

        let picked = registry.select(&ma("/ip4/1.2.3.4/tcp/1")).unwrap();
        assert_eq!(picked.name(), "ip4-a");

        let picked = registry.select(&ma("/memory/9")).unwrap();
        assert_eq!(picked.name(), "memory");
    }

    #[test]
    fn test_fallback_used_when_nothing_matches() {
        let mut registry = TransportRegistry::with_fallback(StubDialer::new("fallback", "/dns4"));
        registry.add(StubDialer::new("ip4", "/ip4"));

        let picked = registry.select(&ma("/dns4/example.com/tcp/1")).unwrap();
        assert_eq!(picked.name(), "fallback");

        assert!(registry.select(&ma("/ip6/::1/tcp/1")).is_none());
    }

    #[test]
    fn test_default_fallback_is_tcp() {
        let registry = TransportRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.select(&ma("/ip4/127.0.0.1/tcp/1")).unwrap().name(),
            "tcp"
        );
        assert!(registry.select(&ma("/ip4/127.0.0.1/udp/1")).is_none());
        assert!(format!("{:?}", registry).contains("tcp"));
    }

    #[test]
    fn test_tcp_dialer_matches() {
        let dialer = TcpDialer::new();
        assert!(dialer.matches(&ma("/ip4/10.0.0.1/tcp/4001")));
        assert!(dialer.matches(&ma("/ip6/::1/tcp/4001")));
        assert!(!dialer.matches(&ma("/ip4/10.0.0.1/udp/4001")));
        assert!(!dialer.matches(&ma("/dns4/example.com/tcp/4001")));
    }

    #[tokio::test]
    async fn test_tcp_dialer_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = tcp_multiaddr(listener.local_addr().unwrap());

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let conn = TcpDialer::new().dial(&target).await.unwrap();
        let (_stream, peer_addr) = accept.await.unwrap();

        assert_eq!(conn.remote_multiaddr(), target);
        assert_eq!(conn.local_multiaddr(), tcp_multiaddr(peer_addr));
    }

    #[tokio::test]
    async fn test_tcp_dialer_binds_selected_local_addr() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = tcp_multiaddr(listener.local_addr().unwrap());

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        let dialer = TcpDialer::new().with_local_addrs(vec![ma("/ip4/127.0.0.1/tcp/0")]);
        let conn = dialer.dial(&target).await.unwrap();
        accept.await.unwrap();

        let local = tcp_socket_addr(&conn.local_multiaddr()).unwrap();
        assert!(local.ip().is_loopback());
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_tcp_dialer_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = tcp_multiaddr(listener.local_addr().unwrap());
        drop(listener);

        assert!(TcpDialer::new().dial(&target).await.is_err());
    }

    #[tokio::test]
    async fn test_stub_dialer_counts() {
        let stub = StubDialer::new("stub", "/ip4");
        assert!(stub.dial(&ma("/ip4/1.1.1.1/tcp/1")).await.is_err());
        assert_eq!(stub.dials.load(Ordering::SeqCst), 1);
    }
}
