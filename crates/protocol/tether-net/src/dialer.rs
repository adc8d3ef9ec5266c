//! Outgoing connection establishment.
//!
//! [`Dialer::dial`] runs the whole connect sequence as one supervised task:
//!
//! 1. pick a sub-dialer for the address,
//! 2. open the raw connection,
//! 3. apply the optional wrap hook,
//! 4. negotiate the security protocol under a read deadline,
//! 5. wrap the stream into a [`SingleConn`],
//! 6. stop here if encryption is disabled,
//! 7. otherwise run the security handshake and return a [`SecureConn`].
//!
//! Every step is terminal on its first error. Retrying is up to the caller.
//!
//! [`SecureConn`]: crate::SecureConn

use crate::addr::is_unspecified;
use crate::config::DialConfig;
use crate::conn::{Conn, SecureConn, SingleConn};
use crate::error::{NetworkError, NetworkResult};
use crate::negotiate;
use crate::transport::{SubDialer, TransportRegistry, WrapFn};
use libp2p::identity::Keypair;
use libp2p::{Multiaddr, PeerId};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument, Span};

/// Opens connections to remote peers.
pub struct Dialer {
    local_peer: PeerId,
    keypair: Option<Keypair>,
    wrapper: Option<WrapFn>,
    transports: TransportRegistry,
    config: Arc<DialConfig>,
}

impl Dialer {
    /// Create a dialer with the default TCP fallback and no sub-dialers.
    ///
    /// Without a `keypair` connections are never secured, which is only
    /// allowed when `config` disables encryption.
    pub fn new(local_peer: PeerId, keypair: Option<Keypair>, config: Arc<DialConfig>) -> Self {
        Self {
            local_peer,
            keypair,
            wrapper: None,
            transports: TransportRegistry::new(),
            config,
        }
    }

    /// Create a dialer whose identity is derived from `keypair`.
    pub fn with_keypair(keypair: Keypair, config: Arc<DialConfig>) -> Self {
        let local_peer = keypair.public().to_peer_id();
        Self::new(local_peer, Some(keypair), config)
    }

    /// Apply `wrap` to every raw connection before negotiation.
    pub fn with_wrapper(mut self, wrap: WrapFn) -> Self {
        self.wrapper = Some(wrap);
        self
    }

    /// Replace the transport registry.
    pub fn with_transports(mut self, transports: TransportRegistry) -> Self {
        self.transports = transports;
        self
    }

    /// Register a sub-dialer. Must happen before concurrent dials start.
    pub fn add_dialer(&mut self, dialer: Arc<dyn SubDialer>) {
        self.transports.add(dialer);
    }

    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    pub fn config(&self) -> &DialConfig {
        &self.config
    }

    /// Whether dials from this dialer end in a secure channel.
    pub fn encrypts(&self) -> bool {
        self.config.encrypt_connections && self.keypair.is_some()
    }

    /// Connect to `remote` at `addr`.
    ///
    /// Returns [`NetworkError::Cancelled`] as soon as `cancel` fires, and
    /// before looking at the target if it already has. The
    /// in-flight task is told to stop too, and any connection it already
    /// opened or later produces is dropped, which closes it.
    pub async fn dial(
        &self,
        cancel: &CancellationToken,
        addr: &Multiaddr,
        remote: PeerId,
    ) -> NetworkResult<Conn> {
        let span = info_span!(
            "dial",
            local = %self.local_peer,
            remote = %remote,
            addr = %addr,
            encrypted = self.encrypts(),
        );

        if cancel.is_cancelled() {
            debug!(parent: &span, "dial cancelled before start");
            return Err(NetworkError::Cancelled);
        }

        let job = self.prepare(&span, addr, remote).inspect_err(|e| {
            debug!(parent: &span, error = %e, "dial rejected");
        })?;

        let task_cancel = cancel.child_token();
        // Cancels the task if this future is dropped mid-dial as well.
        let _guard = task_cancel.clone().drop_guard();

        let mut handle = tokio::spawn(
            async move {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => Err(NetworkError::Cancelled),
                    result = job.run() => result,
                }
            }
            .instrument(span.clone()),
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NetworkError::Cancelled),
            joined = &mut handle => joined.unwrap_or_else(|e| {
                Err(NetworkError::ConnectionFailed(format!("dial task failed: {}", e)))
            }),
        };

        match &result {
            Ok(conn) => debug!(parent: &span, conn = %conn.id(), "dial succeeded"),
            Err(e) => debug!(parent: &span, error = %e, "dial failed"),
        }
        result
    }

    /// Validate the target and resolve its sub-dialer before any I/O.
    fn prepare(&self, span: &Span, addr: &Multiaddr, remote: PeerId) -> NetworkResult<DialJob> {
        if is_unspecified(addr) {
            return Err(NetworkError::InvalidTarget(addr.clone()));
        }
        if self.config.encrypt_connections && self.keypair.is_none() {
            return Err(NetworkError::MissingPrivateKey);
        }

        let transport = self
            .transports
            .select(addr)
            .ok_or_else(|| NetworkError::NoTransport(addr.clone()))?;
        debug!(parent: span, transport = transport.name(), "selected sub-dialer");

        Ok(DialJob {
            local_peer: self.local_peer,
            remote,
            addr: addr.clone(),
            transport,
            keypair: self.keypair.clone(),
            wrapper: self.wrapper.clone(),
            config: self.config.clone(),
        })
    }
}

impl fmt::Display for Dialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Dialer {} ...>", self.local_peer)
    }
}

impl fmt::Debug for Dialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialer")
            .field("local_peer", &self.local_peer)
            .field("has_keypair", &self.keypair.is_some())
            .field("has_wrapper", &self.wrapper.is_some())
            .field("transports", &self.transports)
            .field("config", &self.config)
            .finish()
    }
}

/// Everything the spawned dial task owns.
struct DialJob {
    local_peer: PeerId,
    remote: PeerId,
    addr: Multiaddr,
    transport: Arc<dyn SubDialer>,
    keypair: Option<Keypair>,
    wrapper: Option<WrapFn>,
    config: Arc<DialConfig>,
}

impl DialJob {
    async fn run(self) -> NetworkResult<Conn> {
        let mut raw = self
            .transport
            .dial(&self.addr)
            .await
            .map_err(|source| NetworkError::TransportDial {
                addr: self.addr.clone(),
                source,
            })?;

        if let Some(wrap) = &self.wrapper {
            raw = wrap(raw);
        }

        // Dropping `raw` on error closes it.
        negotiate::with_deadline(
            self.config.negotiate_timeout,
            negotiate::select_proto_or_fail(self.config.security_tag(), &mut raw),
        )
        .await?;

        let conn = SingleConn::new(self.local_peer, Some(self.remote), raw);

        let keypair = match self.keypair {
            Some(keypair) if self.config.encrypt_connections => keypair,
            _ => {
                warn!(remote = %self.remote, addr = %self.addr, "dialing INSECURELY");
                return Ok(Conn::Insecure(conn));
            }
        };

        let secure = SecureConn::outbound(keypair, conn, self.remote).await?;
        Ok(Conn::Secure(secure))
    }
}
