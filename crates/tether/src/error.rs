//! Unified error type for the Tether framework.

use tether_protocol::ProtocolError;
use tether_session::SessionError;
use tether_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `tether` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (envelope parse or encode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, dispatch, handler binding).
    #[error(transparent)]
    Session(#[from] SessionError),
}
