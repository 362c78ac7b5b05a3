//! # Tether
//!
//! Authenticated real-time session framework over WebSockets.
//!
//! Tether keeps one stateful, authenticated session per connected
//! client. Applications register message handler bindings (a message
//! type, a payload schema, a callback) and lifecycle callbacks; the
//! framework handles envelope parsing, JWT authentication with identity
//! pinning, renewal and expiry timers, liveness probing, and graceful
//! shutdown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TetherError> {
//!     tether::init_tracing();
//!
//!     let server = Server::builder()
//!         .bind("0.0.0.0:8080")
//!         .handler(MessageHandler::new(
//!             "note",
//!             PayloadSchema::new().required("text", FieldKind::String),
//!             |payload, session| async move {
//!                 session
//!                     .send_message("noteAck", payload, SendOptions::new())
//!                     .await
//!             },
//!         ))
//!         .build(JwtVerifier::hs256(b"secret"))
//!         .await?;
//!     server.run().await
//! }
//! ```

mod error;
mod server;

pub use error::TetherError;
pub use server::{Server, ServerBuilder};

/// Commonly used types, re-exported in one place.
pub mod prelude {
    pub use crate::{Server, ServerBuilder, TetherError};
    pub use tether_protocol::{Envelope, FieldKind, PayloadSchema};
    pub use tether_session::{
        Identity, JwtVerifier, MessageHandler, SendOptions, Session,
        SessionConfig, SessionError, SessionHooks, SessionId, TokenClaims,
        TokenVerifier,
    };
    pub use tether_transport::{HandshakeContext, WebSocketConnection};
}

/// Installs a `tracing` subscriber reading the `RUST_LOG` environment
/// variable, defaulting to `info`. A no-op if a subscriber is already
/// set, so tests can call it freely.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
