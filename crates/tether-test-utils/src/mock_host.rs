//! Mock implementation of the `Host` trait for testing.
//!
//! Records connect calls and stream activity, and lets tests mark peers as
//! already connected or make connects fail.

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tether_net::{
    meter_stream, BandwidthCounter, BandwidthReporter, BoxedStream, Host, MemoryPeerstore,
    NetStream, NetworkError, NetworkResult, PeerInfo, Peerstore, StreamHandler,
};
use tokio::io::DuplexStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tokio_util::sync::CancellationToken;

/// An in-memory protocol stream.
pub struct MockStream {
    io: Compat<DuplexStream>,
    protocol: StreamProtocol,
    peer: PeerId,
}

impl MockStream {
    /// A connected pair of streams for `protocol`.
    ///
    /// The first reports `b` as its remote peer, the second reports `a`.
    pub fn pair(protocol: StreamProtocol, a: PeerId, b: PeerId) -> (Self, Self) {
        let (x, y) = tokio::io::duplex(64 * 1024);
        (
            Self {
                io: x.compat(),
                protocol: protocol.clone(),
                peer: b,
            },
            Self {
                io: y.compat(),
                protocol,
                peer: a,
            },
        )
    }
}

impl NetStream for MockStream {
    fn protocol(&self) -> &StreamProtocol {
        &self.protocol
    }

    fn remote_peer(&self) -> PeerId {
        self.peer
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_close(cx)
    }
}

struct MockHostInner {
    /// Local peer ID.
    local_peer: PeerId,
    /// Listen addresses.
    listen_addrs: Vec<Multiaddr>,
    /// Peers with an open connection.
    connected: HashSet<PeerId>,
    /// Every connect call, in order (spy pattern).
    connect_calls: Vec<PeerInfo>,
    /// When set, connects fail with this message.
    connect_failure: Option<String>,
    /// Registered inbound stream handlers.
    handlers: HashMap<StreamProtocol, StreamHandler>,
    /// Far ends of streams opened with `new_stream`.
    remote_streams: Vec<MockStream>,
    /// Whether `close` was called.
    closed: bool,
}

/// A mock implementation of the `Host` trait for testing.
///
/// A connect succeeds when it carries at least one address, after which
/// the peer counts as connected. Uses `Arc<Mutex<...>>` internally, so it
/// is cheap to clone and all clones share the same state.
#[derive(Clone)]
pub struct MockHost {
    inner: Arc<Mutex<MockHostInner>>,
    peerstore: Arc<MemoryPeerstore>,
    bandwidth: Arc<BandwidthCounter>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    /// Create a new MockHost with a random local peer ID.
    pub fn new() -> Self {
        Self::with_local_peer_id(PeerId::random())
    }

    /// Create a new MockHost with a specific local peer ID.
    pub fn with_local_peer_id(local_peer: PeerId) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockHostInner {
                local_peer,
                listen_addrs: Vec::new(),
                connected: HashSet::new(),
                connect_calls: Vec::new(),
                connect_failure: None,
                handlers: HashMap::new(),
                remote_streams: Vec::new(),
                closed: false,
            })),
            peerstore: Arc::new(MemoryPeerstore::new()),
            bandwidth: Arc::new(BandwidthCounter::new()),
        }
    }

    // =========================================================================
    // Builder Methods
    // =========================================================================

    /// Set the listen addresses reported by `addrs()`.
    pub fn with_listen_addrs(self, addrs: Vec<Multiaddr>) -> Self {
        self.inner.lock().unwrap().listen_addrs = addrs;
        self
    }

    /// Treat `peer` as already connected.
    pub fn with_connected_peer(self, peer: PeerId) -> Self {
        self.inner.lock().unwrap().connected.insert(peer);
        self
    }

    /// Make every connect fail with `message`.
    pub fn with_connect_failure(self, message: impl Into<String>) -> Self {
        self.inner.lock().unwrap().connect_failure = Some(message.into());
        self
    }

    // =========================================================================
    // Inspection Methods
    // =========================================================================

    /// All connect calls in order.
    pub fn connect_calls(&self) -> Vec<PeerInfo> {
        self.inner.lock().unwrap().connect_calls.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.inner.lock().unwrap().connect_calls.len()
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.inner.lock().unwrap().connected.contains(peer)
    }

    pub fn has_handler(&self, protocol: &StreamProtocol) -> bool {
        self.inner.lock().unwrap().handlers.contains_key(protocol)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// The concrete bandwidth counter behind `bandwidth_reporter()`.
    pub fn bandwidth(&self) -> Arc<BandwidthCounter> {
        self.bandwidth.clone()
    }

    /// Take the far end of the oldest stream opened with `new_stream`.
    pub fn take_remote_stream(&self) -> Option<MockStream> {
        let mut inner = self.inner.lock().unwrap();
        if inner.remote_streams.is_empty() {
            None
        } else {
            Some(inner.remote_streams.remove(0))
        }
    }

    /// Simulate `peer` opening a stream for `protocol` to this host.
    ///
    /// Runs the registered handler on the local end and returns the remote
    /// end, or `None` when no handler is registered.
    pub fn deliver_inbound(&self, protocol: StreamProtocol, peer: PeerId) -> Option<MockStream> {
        let (handler, local_peer) = {
            let inner = self.inner.lock().unwrap();
            (inner.handlers.get(&protocol)?.clone(), inner.local_peer)
        };
        let (remote, local) = MockStream::pair(protocol, peer, local_peer);
        handler(Box::new(local));
        Some(remote)
    }
}

#[async_trait]
impl Host for MockHost {
    fn id(&self) -> PeerId {
        self.inner.lock().unwrap().local_peer
    }

    fn addrs(&self) -> Vec<Multiaddr> {
        self.inner.lock().unwrap().listen_addrs.clone()
    }

    fn peerstore(&self) -> Arc<dyn Peerstore> {
        self.peerstore.clone()
    }

    fn connections_to_peer(&self, peer: &PeerId) -> usize {
        usize::from(self.inner.lock().unwrap().connected.contains(peer))
    }

    async fn connect(&self, cancel: &CancellationToken, peer: PeerInfo) -> NetworkResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_calls.push(peer.clone());

        if cancel.is_cancelled() {
            return Err(NetworkError::Cancelled);
        }
        if inner.closed {
            return Err(NetworkError::HostClosed);
        }
        if let Some(message) = &inner.connect_failure {
            return Err(NetworkError::ConnectionFailed(message.clone()));
        }
        if peer.addrs.is_empty() {
            return Err(NetworkError::ConnectionFailed(format!(
                "no addresses for {}",
                peer.id
            )));
        }

        inner.connected.insert(peer.id);
        Ok(())
    }

    async fn new_stream(
        &self,
        _cancel: &CancellationToken,
        protocol: StreamProtocol,
        peer: PeerId,
    ) -> NetworkResult<BoxedStream> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected.contains(&peer) {
            return Err(NetworkError::ConnectionFailed(format!(
                "not connected to {}",
                peer
            )));
        }

        let (local, remote) = MockStream::pair(protocol, inner.local_peer, peer);
        inner.remote_streams.push(remote);
        Ok(meter_stream(Box::new(local), self.bandwidth.clone()))
    }

    fn set_stream_handler(&self, protocol: StreamProtocol, handler: StreamHandler) {
        self.inner.lock().unwrap().handlers.insert(protocol, handler);
    }

    fn remove_stream_handler(&self, protocol: &StreamProtocol) {
        self.inner.lock().unwrap().handlers.remove(protocol);
    }

    async fn close(&self) -> NetworkResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        inner.connected.clear();
        Ok(())
    }

    fn bandwidth_reporter(&self) -> Arc<dyn BandwidthReporter> {
        self.bandwidth.clone()
    }
}
