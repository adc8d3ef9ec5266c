//! Byte-counting stream wrapper.

use crate::bandwidth::BandwidthReporter;
use crate::stream::{BoxedStream, NetStream};
use futures::{AsyncRead, AsyncWrite};
use libp2p::{PeerId, StreamProtocol};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Callback receiving `(bytes, protocol, peer)`.
pub type MeterCallback = Arc<dyn Fn(u64, &StreamProtocol, &PeerId) + Send + Sync>;

/// Wraps a stream and reports every byte moved through it.
///
/// Reads report through `on_recv`, writes through `on_sent`, using the count
/// the inner stream returned. Calls that move no bytes or fail report
/// nothing, and errors pass through untouched. Like the inner stream, it
/// expects one reader and one writer.
pub struct MeteredStream<S> {
    inner: S,
    protocol: StreamProtocol,
    peer: PeerId,
    on_recv: MeterCallback,
    on_sent: MeterCallback,
}

impl<S> MeteredStream<S> {
    pub fn new(
        inner: S,
        protocol: StreamProtocol,
        peer: PeerId,
        on_recv: MeterCallback,
        on_sent: MeterCallback,
    ) -> Self {
        Self {
            inner,
            protocol,
            peer,
            on_recv,
            on_sent,
        }
    }

    /// Report into a [`BandwidthReporter`].
    pub fn with_reporter(
        inner: S,
        protocol: StreamProtocol,
        peer: PeerId,
        reporter: Arc<dyn BandwidthReporter>,
    ) -> Self {
        let recv = reporter.clone();
        let on_recv: MeterCallback =
            Arc::new(move |n, proto, peer| recv.log_recv_stream(n, proto, peer));
        let on_sent: MeterCallback =
            Arc::new(move |n, proto, peer| reporter.log_sent_stream(n, proto, peer));
        Self::new(inner, protocol, peer, on_recv, on_sent)
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Meter a stream, taking protocol and peer from the stream itself.
pub fn meter_stream(stream: BoxedStream, reporter: Arc<dyn BandwidthReporter>) -> BoxedStream {
    let protocol = stream.protocol().clone();
    let peer = stream.remote_peer();
    Box::new(MeteredStream::with_reporter(stream, protocol, peer, reporter))
}

impl<S: AsyncRead + Unpin> AsyncRead for MeteredStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(n)) = res {
            if n > 0 {
                (this.on_recv)(n as u64, &this.protocol, &this.peer);
            }
        }
        res
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for MeteredStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let res = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = res {
            if n > 0 {
                (this.on_sent)(n as u64, &this.protocol, &this.peer);
            }
        }
        res
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_close(cx)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> NetStream for MeteredStream<S> {
    fn protocol(&self) -> &StreamProtocol {
        &self.protocol
    }

    fn remote_peer(&self) -> PeerId {
        self.peer
    }
}
