//! Bandwidth accounting.
//!
//! [`BandwidthCounter`] keeps its totals in Prometheus counters so the same
//! numbers can be scraped once registered with a [`Registry`].

use libp2p::{PeerId, StreamProtocol};
use prometheus::{IntCounterVec, Opts, Registry};

/// Receives byte counts from metered streams.
pub trait BandwidthReporter: Send + Sync {
    /// `bytes` were written to a stream of `protocol` with `peer`.
    fn log_sent_stream(&self, bytes: u64, protocol: &StreamProtocol, peer: &PeerId);

    /// `bytes` were read from a stream of `protocol` with `peer`.
    fn log_recv_stream(&self, bytes: u64, protocol: &StreamProtocol, peer: &PeerId);
}

/// Cumulative traffic totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandwidthStats {
    pub total_in: u64,
    pub total_out: u64,
}

const IN: &str = "in";
const OUT: &str = "out";

/// A [`BandwidthReporter`] that keeps totals overall, per protocol and per peer.
#[derive(Clone)]
pub struct BandwidthCounter {
    /// Bytes by direction.
    total_bytes: IntCounterVec,

    /// Bytes by direction and protocol.
    protocol_bytes: IntCounterVec,

    /// Bytes by direction and peer.
    peer_bytes: IntCounterVec,
}

impl Default for BandwidthCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthCounter {
    pub fn new() -> Self {
        let total_bytes = IntCounterVec::new(
            Opts::new("tether_stream_bytes_total", "Total stream bytes"),
            &["direction"],
        )
        .expect("metric creation should not fail");

        let protocol_bytes = IntCounterVec::new(
            Opts::new(
                "tether_stream_protocol_bytes_total",
                "Total stream bytes by protocol",
            ),
            &["direction", "protocol"],
        )
        .expect("metric creation should not fail");

        let peer_bytes = IntCounterVec::new(
            Opts::new("tether_stream_peer_bytes_total", "Total stream bytes by peer"),
            &["direction", "peer"],
        )
        .expect("metric creation should not fail");

        Self {
            total_bytes,
            protocol_bytes,
            peer_bytes,
        }
    }

    /// Register the counters with `registry`.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.total_bytes.clone()))?;
        registry.register(Box::new(self.protocol_bytes.clone()))?;
        registry.register(Box::new(self.peer_bytes.clone()))?;
        Ok(())
    }

    /// Totals across all protocols and peers.
    pub fn totals(&self) -> BandwidthStats {
        BandwidthStats {
            total_in: self.total_bytes.with_label_values(&[IN]).get(),
            total_out: self.total_bytes.with_label_values(&[OUT]).get(),
        }
    }

    /// Totals for one protocol.
    pub fn stats_for_protocol(&self, protocol: &StreamProtocol) -> BandwidthStats {
        let protocol = protocol.as_ref();
        BandwidthStats {
            total_in: self.protocol_bytes.with_label_values(&[IN, protocol]).get(),
            total_out: self.protocol_bytes.with_label_values(&[OUT, protocol]).get(),
        }
    }

    /// Totals for one peer.
    pub fn stats_for_peer(&self, peer: &PeerId) -> BandwidthStats {
        let peer = peer.to_base58();
        BandwidthStats {
            total_in: self.peer_bytes.with_label_values(&[IN, peer.as_str()]).get(),
            total_out: self.peer_bytes.with_label_values(&[OUT, peer.as_str()]).get(),
        }
    }

    fn record(&self, direction: &str, bytes: u64, protocol: &StreamProtocol, peer: &PeerId) {
        let peer = peer.to_base58();
        self.total_bytes.with_label_values(&[direction]).inc_by(bytes);
        self.protocol_bytes
            .with_label_values(&[direction, protocol.as_ref()])
            .inc_by(bytes);
        self.peer_bytes
            .with_label_values(&[direction, peer.as_str()])
            .inc_by(bytes);
    }
}

impl BandwidthReporter for BandwidthCounter {
    fn log_sent_stream(&self, bytes: u64, protocol: &StreamProtocol, peer: &PeerId) {
        self.record(OUT, bytes, protocol, peer);
    }

    fn log_recv_stream(&self, bytes: u64, protocol: &StreamProtocol, peer: &PeerId) {
        self.record(IN, bytes, protocol, peer);
    }
}
