//! Transport establishment for the Tether P2P stack.
//!
//! This crate turns "connect to this peer" into an authenticated byte
//! stream. It includes:
//!
//! - **Dialing**: sub-transport selection, a single-round security
//!   protocol negotiation, and the noise handshake
//! - **Listening**: the accepting half of the same sequence, with IP
//!   deny filters
//! - **Routed connects**: address lookup through a routing system when the
//!   peerstore has nothing cached
//! - **Bandwidth metering**: byte counting for protocol streams
//!
//! # Overview
//!
//! A dial runs these steps, each terminal on its first error:
//!
//! - reject wildcard targets such as `/ip4/0.0.0.0/tcp/4001`
//! - pick the first registered [`SubDialer`] whose `matches` accepts the
//!   address, else the TCP fallback
//! - open the raw connection and apply the optional [`WrapFn`]
//! - propose `/noise` (or `/plaintext/1.0.0` when encryption is disabled)
//!   under a 60 second read deadline
//! - run the noise handshake and verify the remote identity
//!
//! Whether connections are encrypted is fixed once per process by a shared
//! [`DialConfig`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_net::{identity::Keypair, DialConfig, Dialer, Multiaddr, PeerId};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example(remote: PeerId) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(DialConfig::default());
//!     let dialer = Dialer::with_keypair(Keypair::generate_ed25519(), config);
//!
//!     let addr: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse()?;
//!     let cancel = CancellationToken::new();
//!     let conn = dialer.dial(&cancel, &addr, remote).await?;
//!     println!("connected to {:?} over {}", conn.remote_peer(), conn.id());
//!     Ok(())
//! }
//! ```
//!
//! # Routed connects
//!
//! ```no_run
//! use tether_net::{Host, PeerInfo, RoutedHost, Routing};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example<H: Host, R: Routing>(host: H, routing: R, peer: libp2p::PeerId) {
//!     let routed = RoutedHost::wrap(host, routing);
//!     let cancel = CancellationToken::new();
//!
//!     // No addresses given: the routing system is asked for them.
//!     routed.connect(&cancel, PeerInfo::from_id(peer)).await.unwrap();
//! }
//! ```

pub mod addr;
pub mod bandwidth;
pub mod config;
pub mod conn;
pub mod dialer;
pub mod error;
pub mod filter;
pub mod listen;
pub mod meter;
pub mod negotiate;
pub mod peer;
pub mod peerstore;
pub mod routed;
pub mod stream;
pub mod traits;
pub mod transport;

// Re-export main types at crate root

// Configuration
pub use config::{DialConfig, RoutedHostConfig, DEFAULT_NEGOTIATE_TIMEOUT};

// Error types
pub use error::{ErrorKind, NegotiationError, NetworkError, NetworkResult};

// Address selection
pub use addr::{select_local_addr, AddrClass};

// Connections
pub use conn::{Conn, ConnectionId, SecureConn, SingleConn};
pub use dialer::Dialer;
pub use filter::AddrFilters;
pub use listen::{InboundUpgrader, Listener};
pub use transport::{
    BoxedConnection, RawConnection, SubDialer, TcpConnection, TcpDialer, TransportRegistry, WrapFn,
};

// Peers
pub use peer::PeerInfo;
pub use peerstore::{
    MemoryPeerstore, Peerstore, PERMANENT_ADDR_TTL, PROVIDER_ADDR_TTL, TEMP_ADDR_TTL,
};

// Streams and metering
pub use bandwidth::{BandwidthCounter, BandwidthReporter, BandwidthStats};
pub use meter::{meter_stream, MeterCallback, MeteredStream};
pub use stream::{BoxedStream, NetStream, StreamHandler};

// Host surface
pub use routed::RoutedHost;
pub use traits::{Host, Routing};

// Re-export libp2p types commonly needed
pub use libp2p::{identity, multiaddr, Multiaddr, PeerId, StreamProtocol};
