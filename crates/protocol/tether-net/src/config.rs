//! Network configuration.
//!
//! This module defines configuration options for dialing, listening and
//! routed connects.

use crate::negotiate::{NO_ENCRYPTION_TAG, SECURE_CHANNEL_TAG};
use crate::peerstore::TEMP_ADDR_TTL;
use std::time::Duration;

/// Default read deadline for security protocol negotiation.
pub const DEFAULT_NEGOTIATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection security policy shared by every dialer and listener of a process.
///
/// A node either encrypts all of its transports or none of them: a node that
/// does not encrypt cannot talk to encrypting networks. Build one value at
/// start-up, wrap it in an `Arc` and hand it to each [`Dialer`] and
/// [`Listener`]; it cannot change afterwards.
///
/// [`Dialer`]: crate::Dialer
/// [`Listener`]: crate::Listener
#[derive(Debug, Clone)]
pub struct DialConfig {
    /// Whether connections are negotiated and upgraded to a secure channel.
    ///
    /// Disabling encryption is meant for protocol debugging, interop work and
    /// private networks that must run in cleartext.
    ///
    /// Default: true.
    pub encrypt_connections: bool,

    /// Read deadline for the security protocol negotiation.
    ///
    /// Bounds how long a stalled or malicious peer can hold a dial open
    /// before the handshake starts.
    ///
    /// Default: 60 seconds.
    pub negotiate_timeout: Duration,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            encrypt_connections: true,
            negotiate_timeout: DEFAULT_NEGOTIATE_TIMEOUT,
        }
    }
}

impl DialConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration that never encrypts connections.
    pub fn insecure() -> Self {
        Self::default().with_encryption(false)
    }

    /// Enable or disable connection encryption.
    pub fn with_encryption(mut self, enable: bool) -> Self {
        self.encrypt_connections = enable;
        self
    }

    /// Set the negotiation read deadline.
    pub fn with_negotiate_timeout(mut self, timeout: Duration) -> Self {
        self.negotiate_timeout = timeout;
        self
    }

    /// The protocol tag proposed during negotiation under this policy.
    pub fn security_tag(&self) -> &'static str {
        if self.encrypt_connections {
            SECURE_CHANNEL_TAG
        } else {
            NO_ENCRYPTION_TAG
        }
    }
}

/// Configuration for [`RoutedHost`](crate::RoutedHost).
#[derive(Debug, Clone)]
pub struct RoutedHostConfig {
    /// Expiry for addresses supplied by callers or resolved via routing.
    ///
    /// Kept short on purpose: the host prefers re-resolving over trusting
    /// stale topology.
    ///
    /// Default: 10 seconds.
    pub address_ttl: Duration,
}

impl Default for RoutedHostConfig {
    fn default() -> Self {
        Self {
            address_ttl: TEMP_ADDR_TTL,
        }
    }
}

impl RoutedHostConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address expiry.
    pub fn with_address_ttl(mut self, ttl: Duration) -> Self {
        self.address_ttl = ttl;
        self
    }
}
