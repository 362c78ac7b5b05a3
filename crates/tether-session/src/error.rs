//! Error types for the session layer.
//!
//! The taxonomy matters more than the variants: client/protocol errors
//! are reported to the peer with a machine-readable code and a hint and
//! never close the connection; everything else is logged in full
//! server-side while the peer sees only a generic `server-error`.

use serde_json::{json, Value};
use tether_protocol::{ProtocolError, SchemaViolations};

/// Errors that can occur on the session dispatch and lifecycle paths.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The inbound frame failed envelope parsing.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An `authenticate` payload without a usable `token` field.
    #[error("no token")]
    NoToken,

    /// The Token Verifier rejected the token (bad signature, expired,
    /// malformed claims).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A token for a different subject than the one this session is
    /// pinned to. The first successful authentication binds the
    /// identity for the life of the session.
    #[error("wrong user token")]
    WrongUser,

    /// The payload failed a handler binding's schema.
    #[error("message validation failed: {0}")]
    Validation(SchemaViolations),

    /// A business callback failed. Details stay server-side.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Writing to the transport failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A malformed handler binding was supplied at construction.
    /// Fatal: no session is created.
    #[error("invalid message handler: {0}")]
    InvalidHandler(String),
}

impl SessionError {
    /// The machine-readable code carried by the `error` push.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol(ProtocolError::NonJson) => "non-json",
            Self::NoToken => "no-token",
            Self::AuthFailed(_) => "auth-failed",
            Self::WrongUser => "wrong-user-token",
            Self::Validation(_) => "validation-failed",
            // Everything else is an internal failure the peer gets no
            // detail about.
            Self::Protocol(_)
            | Self::Handler(_)
            | Self::Transport(_)
            | Self::InvalidHandler(_) => "server-error",
        }
    }

    /// Whether this is a client/protocol error (reported at debug level)
    /// as opposed to an internal one (logged in full at error level).
    pub fn is_client_error(&self) -> bool {
        self.code() != "server-error"
    }

    /// The hint carried by the `error` push.
    ///
    /// Client errors get something actionable; internal errors get
    /// `null` so no server detail leaks.
    pub fn hint(&self) -> Value {
        match self {
            Self::Protocol(ProtocolError::NonJson) => {
                json!("message must be a JSON object")
            }
            Self::NoToken => {
                json!("authenticate payload requires a token field")
            }
            Self::AuthFailed(reason) => json!(reason),
            Self::WrongUser => {
                json!("token subject does not match the session identity")
            }
            Self::Validation(violations) => {
                serde_json::to_value(violations).unwrap_or(Value::Null)
            }
            _ => Value::Null,
        }
    }
}
