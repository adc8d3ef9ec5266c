//! A host that resolves unknown peers through a routing system.

use crate::bandwidth::BandwidthReporter;
use crate::config::RoutedHostConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::peer::PeerInfo;
use crate::peerstore::Peerstore;
use crate::stream::{BoxedStream, StreamHandler};
use crate::traits::{Host, Routing};
use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Wraps a [`Host`] so that `connect` can reach peers with no known address.
///
/// Only `connect` differs from the wrapped host. Addresses the caller
/// supplies and addresses the routing system returns are cached for
/// [`RoutedHostConfig::address_ttl`], so churned peers are re-resolved
/// rather than dialed at stale locations.
pub struct RoutedHost<H, R> {
    host: H,
    routing: R,
    config: RoutedHostConfig,
}

impl<H: Host, R: Routing> RoutedHost<H, R> {
    /// Wrap `host` with the default configuration.
    pub fn wrap(host: H, routing: R) -> Self {
        Self::new(host, routing, RoutedHostConfig::default())
    }

    pub fn new(host: H, routing: R, config: RoutedHostConfig) -> Self {
        Self {
            host,
            routing,
            config,
        }
    }

    pub fn inner(&self) -> &H {
        &self.host
    }

    pub fn routing(&self) -> &R {
        &self.routing
    }

    pub fn config(&self) -> &RoutedHostConfig {
        &self.config
    }

    async fn resolve(&self, cancel: &CancellationToken, peer: PeerId) -> NetworkResult<Vec<Multiaddr>> {
        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
            found = self.routing.find_peer(cancel, peer) => found,
        };

        let info = found.map_err(|e| match e {
            NetworkError::Cancelled => NetworkError::Cancelled,
            other => NetworkError::RoutingLookup {
                peer,
                source: Box::new(other),
            },
        })?;

        if info.id != peer {
            warn!(wanted = %peer, got = %info.id, "routing returned wrong peer");
            return Err(NetworkError::RoutingWrongPeer {
                wanted: peer,
                got: info.id,
            });
        }

        debug!(%peer, addrs = info.addrs.len(), "resolved peer through routing");
        Ok(info.addrs)
    }
}

#[async_trait]
impl<H: Host, R: Routing> Host for RoutedHost<H, R> {
    fn id(&self) -> PeerId {
        self.host.id()
    }

    fn addrs(&self) -> Vec<Multiaddr> {
        self.host.addrs()
    }

    fn peerstore(&self) -> Arc<dyn Peerstore> {
        self.host.peerstore()
    }

    fn connections_to_peer(&self, peer: &PeerId) -> usize {
        self.host.connections_to_peer(peer)
    }

    async fn connect(&self, cancel: &CancellationToken, peer: PeerInfo) -> NetworkResult<()> {
        if self.host.connections_to_peer(&peer.id) > 0 {
            return Ok(());
        }

        let peerstore = self.host.peerstore();
        let ttl = self.config.address_ttl;

        if !peer.addrs.is_empty() {
            peerstore.add_addrs(&peer.id, &peer.addrs, ttl);
        }

        let mut addrs = peerstore.addrs(&peer.id);
        if addrs.is_empty() {
            addrs = self.resolve(cancel, peer.id).await?;
            peerstore.add_addrs(&peer.id, &addrs, ttl);
        }

        self.host.connect(cancel, PeerInfo::new(peer.id, addrs)).await
    }

    async fn new_stream(
        &self,
        cancel: &CancellationToken,
        protocol: StreamProtocol,
        peer: PeerId,
    ) -> NetworkResult<BoxedStream> {
        self.host.new_stream(cancel, protocol, peer).await
    }

    fn set_stream_handler(&self, protocol: StreamProtocol, handler: StreamHandler) {
        self.host.set_stream_handler(protocol, handler)
    }

    fn remove_stream_handler(&self, protocol: &StreamProtocol) {
        self.host.remove_stream_handler(protocol)
    }

    async fn close(&self) -> NetworkResult<()> {
        self.host.close().await
    }

    fn bandwidth_reporter(&self) -> Arc<dyn BandwidthReporter> {
        self.host.bandwidth_reporter()
    }
}
