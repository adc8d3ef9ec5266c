//! In-process transport for tests.
//!
//! Listeners register on a [`MemoryHub`] under `/memory/<port>`;
//! a [`MemoryDialer`] sharing the hub connects to them through an
//! in-memory duplex pipe.

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};
use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tether_net::{BoxedConnection, RawConnection, SubDialer};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

const PIPE_CAPACITY: usize = 64 * 1024;

/// The port of a `/memory/<port>` address.
pub fn memory_port(addr: &Multiaddr) -> Option<u64> {
    let mut iter = addr.iter();
    match (iter.next(), iter.next()) {
        (Some(Protocol::Memory(port)), None) => Some(port),
        _ => None,
    }
}

/// `/memory/<port>`.
pub fn memory_addr(port: u64) -> Multiaddr {
    Multiaddr::empty().with(Protocol::Memory(port))
}

struct HubInner {
    listeners: HashMap<u64, mpsc::UnboundedSender<BoxedConnection>>,
    next_port: u64,
}

/// Registry of in-memory listeners. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                listeners: HashMap::new(),
                next_port: 1,
            })),
        }
    }

    /// Listen on the next free port.
    pub fn listen(&self) -> MemoryListener {
        let mut inner = self.inner.lock().unwrap();
        let port = inner.next_port;
        inner.next_port += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.listeners.insert(port, tx);
        MemoryListener {
            addr: memory_addr(port),
            incoming: rx,
        }
    }

    /// A dialer connecting to this hub's listeners.
    pub fn dialer(&self) -> MemoryDialer {
        MemoryDialer {
            hub: self.clone(),
            dials: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn connect(&self, port: u64) -> io::Result<BoxedConnection> {
        let inner = self.inner.lock().unwrap();
        let tx = inner
            .listeners
            .get(&port)
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))?;

        // The dialing side gets an ephemeral port of its own.
        let local = memory_addr(u64::MAX - port);
        let remote = memory_addr(port);
        let (a, b) = tokio::io::duplex(PIPE_CAPACITY);

        let accepted = MemoryConnection::new(b, remote.clone(), local.clone());
        tx.send(Box::new(accepted))
            .map_err(|_| io::Error::from(io::ErrorKind::ConnectionRefused))?;
        Ok(Box::new(MemoryConnection::new(a, local, remote)))
    }
}

/// One end of an in-memory pipe.
pub struct MemoryConnection {
    io: Compat<DuplexStream>,
    local: Multiaddr,
    remote: Multiaddr,
}

impl MemoryConnection {
    pub fn new(io: DuplexStream, local: Multiaddr, remote: Multiaddr) -> Self {
        Self {
            io: io.compat(),
            local,
            remote,
        }
    }

    /// A connected pair, `(dialer side, listener side)`.
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
        let (la, lb) = (memory_addr(1), memory_addr(2));
        (
            Self::new(a, la.clone(), lb.clone()),
            Self::new(b, lb, la),
        )
    }
}

impl RawConnection for MemoryConnection {
    fn local_multiaddr(&self) -> Multiaddr {
        self.local.clone()
    }

    fn remote_multiaddr(&self) -> Multiaddr {
        self.remote.clone()
    }
}

impl AsyncRead for MemoryConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryConnection {
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

/// Receives connections dialed to its `/memory/<port>` address.
pub struct MemoryListener {
    addr: Multiaddr,
    incoming: mpsc::UnboundedReceiver<BoxedConnection>,
}

impl MemoryListener {
    pub fn multiaddr(&self) -> &Multiaddr {
        &self.addr
    }

    /// Wait for the next dialed connection.
    pub async fn accept(&mut self) -> io::Result<BoxedConnection> {
        self.incoming
            .recv()
            .await
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

/// A [`SubDialer`] for `/memory/<port>` addresses.
#[derive(Clone)]
pub struct MemoryDialer {
    hub: MemoryHub,
    dials: Arc<AtomicUsize>,
}

impl MemoryDialer {
    /// Number of dials attempted through this dialer and its clones.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubDialer for MemoryDialer {
    fn matches(&self, addr: &Multiaddr) -> bool {
        memory_port(addr).is_some()
    }

    async fn dial(&self, addr: &Multiaddr) -> io::Result<BoxedConnection> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let port = memory_port(addr)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "not a memory address"))?;
        self.hub.connect(port)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
