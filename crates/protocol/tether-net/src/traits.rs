//! Host and routing trait definitions.
//!
//! A [`Host`] owns connections to peers and the streams opened over them.
//! A [`Routing`] system discovers the addresses of peers the host does not
//! yet know how to reach.

use crate::bandwidth::BandwidthReporter;
use crate::error::NetworkResult;
use crate::peer::PeerInfo;
use crate::peerstore::Peerstore;
use crate::stream::{BoxedStream, StreamHandler};
use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The public surface of a network host.
#[async_trait]
pub trait Host: Send + Sync {
    // =========================================================================
    // Identity
    // =========================================================================

    /// This host's peer id.
    fn id(&self) -> PeerId;

    /// Addresses this host listens on.
    fn addrs(&self) -> Vec<Multiaddr>;

    /// The address book used when connecting.
    fn peerstore(&self) -> Arc<dyn Peerstore>;

    // =========================================================================
    // Connections
    // =========================================================================

    /// Number of live connections to `peer`.
    fn connections_to_peer(&self, peer: &PeerId) -> usize;

    /// Ensure a connection to `peer` exists.
    ///
    /// Uses `peer.addrs` together with whatever the peerstore holds.
    /// Succeeds immediately if a connection is already open.
    async fn connect(&self, cancel: &CancellationToken, peer: PeerInfo) -> NetworkResult<()>;

    // =========================================================================
    // Streams
    // =========================================================================

    /// Open a new stream for `protocol` to `peer`.
    async fn new_stream(
        &self,
        cancel: &CancellationToken,
        protocol: StreamProtocol,
        peer: PeerId,
    ) -> NetworkResult<BoxedStream>;

    /// Route inbound streams of `protocol` to `handler`.
    fn set_stream_handler(&self, protocol: StreamProtocol, handler: StreamHandler);

    /// Stop accepting inbound streams of `protocol`.
    fn remove_stream_handler(&self, protocol: &StreamProtocol);

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Shut down the host and every connection it owns.
    async fn close(&self) -> NetworkResult<()>;

    /// Where this host reports stream traffic.
    fn bandwidth_reporter(&self) -> Arc<dyn BandwidthReporter>;
}

/// Peer address discovery.
#[async_trait]
pub trait Routing: Send + Sync {
    /// Look up the addresses of `peer`.
    async fn find_peer(&self, cancel: &CancellationToken, peer: PeerId) -> NetworkResult<PeerInfo>;
}

#[async_trait]
impl<H: Host + ?Sized> Host for Arc<H> {
    fn id(&self) -> PeerId {
        (**self).id()
    }

    fn addrs(&self) -> Vec<Multiaddr> {
        (**self).addrs()
    }

    fn peerstore(&self) -> Arc<dyn Peerstore> {
        (**self).peerstore()
    }

    fn connections_to_peer(&self, peer: &PeerId) -> usize {
        (**self).connections_to_peer(peer)
    }

    async fn connect(&self, cancel: &CancellationToken, peer: PeerInfo) -> NetworkResult<()> {
        (**self).connect(cancel, peer).await
    }

    async fn new_stream(
        &self,
        cancel: &CancellationToken,
        protocol: StreamProtocol,
        peer: PeerId,
    ) -> NetworkResult<BoxedStream> {
        (**self).new_stream(cancel, protocol, peer).await
    }

    fn set_stream_handler(&self, protocol: StreamProtocol, handler: StreamHandler) {
        (**self).set_stream_handler(protocol, handler)
    }

    fn remove_stream_handler(&self, protocol: &StreamProtocol) {
        (**self).remove_stream_handler(protocol)
    }

    async fn close(&self) -> NetworkResult<()> {
        (**self).close().await
    }

    fn bandwidth_reporter(&self) -> Arc<dyn BandwidthReporter> {
        (**self).bandwidth_reporter()
    }
}

#[async_trait]
impl<R: Routing + ?Sized> Routing for Arc<R> {
    async fn find_peer(&self, cancel: &CancellationToken, peer: PeerId) -> NetworkResult<PeerInfo> {
        (**self).find_peer(cancel, peer).await
    }
}
