//! Protocol streams opened over established connections.

use futures::{AsyncRead, AsyncWrite};
use libp2p::{PeerId, StreamProtocol};
use std::sync::Arc;

/// A bidirectional byte stream speaking one protocol with one peer.
///
/// Closing goes through `AsyncWrite::poll_close`.
pub trait NetStream: AsyncRead + AsyncWrite + Unpin + Send {
    /// The protocol negotiated for this stream.
    fn protocol(&self) -> &StreamProtocol;

    /// The peer on the other end.
    fn remote_peer(&self) -> PeerId;
}

/// An owned stream of any kind.
pub type BoxedStream = Box<dyn NetStream>;

/// Callback invoked for every inbound stream of a registered protocol.
pub type StreamHandler = Arc<dyn Fn(BoxedStream) + Send + Sync>;

impl<S: NetStream + ?Sized> NetStream for Box<S> {
    fn protocol(&self) -> &StreamProtocol {
        (**self).protocol()
    }

    fn remote_peer(&self) -> PeerId {
        (**self).remote_peer()
    }
}
