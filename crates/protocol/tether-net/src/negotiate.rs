//! Security protocol negotiation.
//!
//! A single multistream-select (`/multistream/1.0.0`) round run over the raw
//! connection before any handshake or application bytes flow. The dialer
//! proposes exactly one tag and fails unless the listener echoes it back.
//!
//! Negotiation borrows the connection and reads it frame-exact, so whatever
//! follows the confirmation is left on the stream for the next layer.

use crate::error::NegotiationError;
use futures::{AsyncRead, AsyncWrite};
use multistream_select::{dialer_select_proto, listener_select_proto, ProtocolError, Version};
use std::future::Future;
use std::iter;
use std::time::Duration;

/// Tag proposed when connections are encrypted.
pub const SECURE_CHANNEL_TAG: &str = "/noise";

/// Tag proposed when encryption is disabled process-wide.
pub const NO_ENCRYPTION_TAG: &str = "/plaintext/1.0.0";

/// Propose `protocol` and fail unless the remote accepts it.
pub async fn select_proto_or_fail<S>(protocol: &str, io: &mut S) -> Result<(), NegotiationError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    dialer_select_proto(io, iter::once(protocol), Version::V1)
        .await
        .map(|_| ())
        .map_err(|e| negotiation_error(protocol, e))
}

/// Answer a proposal, accepting only `supported`.
///
/// Other proposals are answered with `na`. Fails once the remote gives up
/// without proposing `supported`.
pub async fn handle_proto<S>(supported: &str, io: &mut S) -> Result<(), NegotiationError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    listener_select_proto(io, iter::once(supported))
        .await
        .map(|_| ())
        .map_err(|e| negotiation_error(supported, e))
}

/// Run a negotiation under a read deadline.
///
/// The deadline covers the negotiation only; once it returns the connection
/// carries no deadline.
pub async fn with_deadline<F>(deadline: Duration, negotiation: F) -> Result<(), NegotiationError>
where
    F: Future<Output = Result<(), NegotiationError>>,
{
    tokio::time::timeout(deadline, negotiation)
        .await
        .map_err(|_| NegotiationError::Timeout(deadline))?
}

fn negotiation_error(protocol: &str, err: multistream_select::NegotiationError) -> NegotiationError {
    match err {
        multistream_select::NegotiationError::Failed => NegotiationError::Unsupported {
            protocol: protocol.to_string(),
        },
        multistream_select::NegotiationError::ProtocolError(ProtocolError::IoError(e)) => {
            NegotiationError::Io(e)
        }
        multistream_select::NegotiationError::ProtocolError(e) => NegotiationError::Protocol(e),
    }
}
