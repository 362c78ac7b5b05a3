//! The per-connection session core for Tether.
//!
//! This crate owns one authenticated, bidirectional, message-oriented
//! connection at a time:
//!
//! 1. **Dispatch** — inbound envelopes route to built-in behaviors
//!    (`authenticate`, `ping`) or to registered [`MessageHandler`]
//!    bindings.
//! 2. **Authentication** — token verification through the
//!    [`TokenVerifier`] trait, identity pinning, and audience-scoped
//!    outbound delivery.
//! 3. **Liveness** — a transport-level ping/pong probe that terminates
//!    dead connections.
//! 4. **Timers** — renew-reminder, token-expiry, and the liveness probe
//!    all share one cancellable-task mechanism ([`TaskHandle`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← accepts connections, owns the SessionRegistry
//!     ↕
//! Session Layer (this crate)  ← identity, dispatch, liveness, timers
//!     ↕
//! Protocol / Transport (below)  ← envelopes and frames
//! ```
//!
//! # Failure philosophy
//!
//! A session fails soft: client mistakes (bad tokens, malformed frames,
//! schema violations) come back as an `error` push and the connection
//! stays open. Only a failed liveness round-trip is fatal, and then
//! only to that one connection.

mod config;
mod error;
mod handler;
mod registry;
mod session;
mod timer;
mod verifier;

pub use config::SessionConfig;
pub use error::SessionError;
pub use handler::MessageHandler;
pub use registry::SessionRegistry;
pub use session::{
    Identity, SendOptions, Session, SessionCallback, SessionHooks, SessionId,
    SessionOptions,
};
pub use timer::TaskHandle;
pub use verifier::{Audience, JwtVerifier, TokenClaims, TokenVerifier};
