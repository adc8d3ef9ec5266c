//! Network error types.
//!
//! This module defines all error types for the tether-net crate.

use libp2p::{Multiaddr, PeerId};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failure categories a caller can act on.
///
/// Every [`NetworkError`] maps onto exactly one kind, which is enough to
/// decide whether to retry with other addresses, give up or escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTarget,
    NoTransport,
    TransportDialFailed,
    NegotiationFailed,
    SecurityUpgradeFailed,
    RoutingLookupFailed,
    RoutingWrongPeer,
    Cancelled,
    Configuration,
    Host,
}

/// Errors raised while negotiating the security protocol.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NegotiationError {
    /// The remote did not answer within the negotiation read deadline.
    #[error("negotiation timed out after {0:?}")]
    Timeout(Duration),

    /// The remote would not agree on the proposed protocol.
    #[error("protocol {protocol} not supported by remote")]
    Unsupported { protocol: String },

    /// The remote broke the multistream-select protocol.
    #[error("negotiation protocol error: {0}")]
    Protocol(multistream_select::ProtocolError),

    /// IO error on the raw connection.
    #[error("IO error during negotiation: {0}")]
    Io(#[from] io::Error),
}

impl NegotiationError {
    /// Returns true if the read deadline expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Network-specific errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NetworkError {
    /// The dial target is a wildcard bind address.
    #[error("attempted to connect to zero address: {0}")]
    InvalidTarget(Multiaddr),

    /// No registered sub-dialer (nor the fallback) handles the address.
    #[error("no dialer for {0}")]
    NoTransport(Multiaddr),

    /// The raw transport connect failed.
    #[error("transport dial to {addr} failed: {source}")]
    TransportDial {
        addr: Multiaddr,
        #[source]
        source: io::Error,
    },

    /// Security protocol negotiation failed.
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Encryption is required but the dialer has no private key.
    #[error("encryption is enabled but no private key is configured")]
    MissingPrivateKey,

    /// The security handshake failed.
    #[error("security upgrade failed: {0}")]
    SecurityUpgrade(String),

    /// The handshake authenticated a different peer than the one dialed.
    #[error("security upgrade failed: expected peer {expected}, remote is {actual}")]
    PeerIdMismatch { expected: PeerId, actual: PeerId },

    /// The routing system could not resolve the peer.
    #[error("routing lookup for {peer} failed: {source}")]
    RoutingLookup {
        peer: PeerId,
        #[source]
        source: Box<NetworkError>,
    },

    /// The routing system returned addresses for a different peer.
    #[error("routing failure: provided addrs for different peer (wanted {wanted}, got {got})")]
    RoutingWrongPeer { wanted: PeerId, got: PeerId },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Failed to connect to peer.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The host has been closed.
    #[error("host closed")]
    HostClosed,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl NetworkError {
    /// The failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTarget(_) => ErrorKind::InvalidTarget,
            Self::NoTransport(_) => ErrorKind::NoTransport,
            Self::TransportDial { .. } => ErrorKind::TransportDialFailed,
            Self::Negotiation(_) => ErrorKind::NegotiationFailed,
            Self::MissingPrivateKey => ErrorKind::Configuration,
            Self::SecurityUpgrade(_) | Self::PeerIdMismatch { .. } => {
                ErrorKind::SecurityUpgradeFailed
            }
            Self::RoutingLookup { .. } => ErrorKind::RoutingLookupFailed,
            Self::RoutingWrongPeer { .. } => ErrorKind::RoutingWrongPeer,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ConnectionFailed(_) | Self::HostClosed | Self::Io(_) => ErrorKind::Host,
        }
    }

    /// Returns true if the caller cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Get a user-friendly suggestion for recovering from this error.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::InvalidTarget(_) => {
                "The address is a wildcard bind address. Dial a concrete host address instead."
            }
            Self::NoTransport(_) => {
                "No transport can dial this address. Register a matching sub-dialer or use a TCP address."
            }
            Self::TransportDial { .. } | Self::ConnectionFailed(_) => {
                "Check network connectivity. Verify the peer address is reachable."
            }
            Self::Negotiation(e) if e.is_timeout() => {
                "The peer did not answer protocol negotiation in time. It may be stalled or overloaded."
            }
            Self::Negotiation(_) => {
                "Protocol negotiation failed. Both peers must agree on the same encryption policy."
            }
            Self::MissingPrivateKey => {
                "Encryption is enabled. Configure a private key or disable encryption for the whole process."
            }
            Self::SecurityUpgrade(_) => {
                "The security handshake failed. The peer may be running an incompatible version."
            }
            Self::PeerIdMismatch { .. } => {
                "The remote identity does not match the expected peer. The address may belong to someone else."
            }
            Self::RoutingLookup { .. } => {
                "The routing system could not find the peer. Wait for discovery or supply addresses."
            }
            Self::RoutingWrongPeer { .. } => {
                "The routing system returned a different peer. Do not reuse those addresses."
            }
            Self::Cancelled => "The operation was cancelled by the caller.",
            Self::HostClosed => "The host is closed. Create a new host to keep connecting.",
            Self::Io(_) => "I/O error. Check the local network configuration.",
        }
    }

    /// Returns true if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransportDial { .. } | Self::ConnectionFailed(_) | Self::Io(_) => true,
            Self::Negotiation(e) => e.is_timeout() || matches!(e, NegotiationError::Io(_)),
            Self::RoutingLookup { .. } => true,
            _ => false,
        }
    }

    /// Suggested retry delay in milliseconds for transient errors.
    ///
    /// Returns `None` for non-transient errors. For transient errors,
    /// returns a suggested base delay (callers should add jitter/backoff).
    pub fn retry_delay_ms(&self) -> Option<u64> {
        if !self.is_transient() {
            return None;
        }
        match self {
            Self::RoutingLookup { .. } => Some(2_000),
            Self::Negotiation(_) => Some(5_000),
            _ => Some(3_000),
        }
    }

    /// Metric labels for monitoring integration.
    ///
    /// Returns `(category, variant)` suitable for use as metric labels.
    pub fn metric_labels(&self) -> (&'static str, &'static str) {
        match self {
            Self::InvalidTarget(_) => ("dial", "invalid_target"),
            Self::NoTransport(_) => ("dial", "no_transport"),
            Self::TransportDial { .. } => ("dial", "transport_dial_failed"),
            Self::Negotiation(e) if e.is_timeout() => ("dial", "negotiation_timeout"),
            Self::Negotiation(_) => ("dial", "negotiation_failed"),
            Self::MissingPrivateKey => ("dial", "missing_private_key"),
            Self::SecurityUpgrade(_) => ("dial", "security_upgrade_failed"),
            Self::PeerIdMismatch { .. } => ("dial", "peer_id_mismatch"),
            Self::RoutingLookup { .. } => ("routing", "lookup_failed"),
            Self::RoutingWrongPeer { .. } => ("routing", "wrong_peer"),
            Self::Cancelled => ("network", "cancelled"),
            Self::ConnectionFailed(_) => ("host", "connection_failed"),
            Self::HostClosed => ("host", "closed"),
            Self::Io(_) => ("host", "io"),
        }
    }
}

/// Result type alias using NetworkError.
pub type NetworkResult<T> = Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let addr: Multiaddr = "/ip4/0.0.0.0/tcp/4001".parse().unwrap();
        let err = NetworkError::InvalidTarget(addr);
        assert_eq!(
            format!("{}", err),
            "attempted to connect to zero address: /ip4/0.0.0.0/tcp/4001"
        );

        let err = NetworkError::Negotiation(NegotiationError::Timeout(Duration::from_secs(5)));
        assert_eq!(format!("{}", err), "negotiation failed: negotiation timed out after 5s");
    }

    #[test]
    fn test_kind() {
        let peer = PeerId::random();
        assert_eq!(NetworkError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            NetworkError::PeerIdMismatch {
                expected: peer,
                actual: PeerId::random()
            }
            .kind(),
            ErrorKind::SecurityUpgradeFailed
        );
        assert_eq!(
            NetworkError::SecurityUpgrade("bad".into()).kind(),
            ErrorKind::SecurityUpgradeFailed
        );
        assert_eq!(
            NetworkError::RoutingWrongPeer {
                wanted: peer,
                got: PeerId::random()
            }
            .kind(),
            ErrorKind::RoutingWrongPeer
        );
        assert_eq!(
            NetworkError::MissingPrivateKey.kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_is_transient() {
        let addr: Multiaddr = "/ip4/10.0.0.1/tcp/4001".parse().unwrap();
        assert!(NetworkError::TransportDial {
            addr: addr.clone(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }
        .is_transient());
        assert!(
            NetworkError::Negotiation(NegotiationError::Timeout(Duration::from_secs(1)))
                .is_transient()
        );

        assert!(!NetworkError::InvalidTarget(addr.clone()).is_transient());
        assert!(!NetworkError::NoTransport(addr).is_transient());
        assert!(!NetworkError::Cancelled.is_transient());
        assert!(!NetworkError::RoutingWrongPeer {
            wanted: PeerId::random(),
            got: PeerId::random()
        }
        .is_transient());
    }

    #[test]
    fn test_retry_delay() {
        assert_eq!(
            NetworkError::ConnectionFailed("test".into()).retry_delay_ms(),
            Some(3_000)
        );
        assert_eq!(NetworkError::MissingPrivateKey.retry_delay_ms(), None);
        assert_eq!(NetworkError::Cancelled.retry_delay_ms(), None);
    }

    #[test]
    fn test_metric_labels() {
        let err = NetworkError::Negotiation(NegotiationError::Timeout(Duration::from_secs(1)));
        assert_eq!(err.metric_labels(), ("dial", "negotiation_timeout"));

        let err = NetworkError::Negotiation(NegotiationError::Protocol(
            multistream_select::ProtocolError::InvalidMessage,
        ));
        assert_eq!(err.metric_labels(), ("dial", "negotiation_failed"));
    }

    #[test]
    fn test_suggestion() {
        assert!(NetworkError::MissingPrivateKey
            .suggestion()
            .contains("private key"));
        let err = NetworkError::Negotiation(NegotiationError::Timeout(Duration::from_secs(1)));
        assert!(err.suggestion().contains("in time"));
    }
}
