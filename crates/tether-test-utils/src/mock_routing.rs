//! Mock implementation of the `Routing` trait for testing.

use async_trait::async_trait;
use libp2p::PeerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_net::{NetworkError, NetworkResult, PeerInfo, Routing};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MockRoutingInner {
    /// Configured answers keyed by the requested peer.
    responses: HashMap<PeerId, PeerInfo>,
    /// Every requested peer, in order.
    lookups: Vec<PeerId>,
    /// Delay before answering.
    delay: Option<Duration>,
}

/// A routing system answering from a fixed table.
///
/// Unknown peers fail with a connection error. Cheap to clone; clones
/// share the same state.
#[derive(Clone, Default)]
pub struct MockRouting {
    inner: Arc<Mutex<MockRoutingInner>>,
}

impl MockRouting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer lookups for `peer` with `info`.
    ///
    /// `info.id` may differ from `peer` to simulate a misbehaving router.
    pub fn with_response(self, peer: PeerId, info: PeerInfo) -> Self {
        self.inner.lock().unwrap().responses.insert(peer, info);
        self
    }

    /// Wait `delay` before each answer.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().delay = Some(delay);
        self
    }

    /// Number of `find_peer` calls so far.
    pub fn lookup_count(&self) -> usize {
        self.inner.lock().unwrap().lookups.len()
    }

    /// Peers looked up, in order.
    pub fn lookups(&self) -> Vec<PeerId> {
        self.inner.lock().unwrap().lookups.clone()
    }
}

#[async_trait]
impl Routing for MockRouting {
    async fn find_peer(&self, cancel: &CancellationToken, peer: PeerId) -> NetworkResult<PeerInfo> {
        let (response, delay) = {
            let mut inner = self.inner.lock().unwrap();
            inner.lookups.push(peer);
            (inner.responses.get(&peer).cloned(), inner.delay)
        };

        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        response.ok_or_else(|| NetworkError::ConnectionFailed(format!("peer {} not found", peer)))
    }
}
