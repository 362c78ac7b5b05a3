//! Wire protocol for Tether's real-time messaging.
//!
//! Everything a Tether session says or hears on the wire is a JSON text
//! frame with the shape `{"type": <string>, "payload": <any>}`. This
//! crate owns that shape:
//!
//! 1. **Envelope parsing** — turning a raw text frame into a typed
//!    [`Envelope`], or failing fast on anything that isn't a JSON object
//!    ([`Envelope::parse`]).
//! 2. **Payload schemas** — declarative per-message-type validation with
//!    field-level failure hints ([`PayloadSchema`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Session Layer (above)  ← dispatches envelopes, replies with envelopes
//!     ↕
//! Protocol Layer (this crate)  ← parses and serializes envelopes
//!     ↕
//! Transport Layer (below)  ← moves raw text frames
//! ```

mod envelope;
mod error;
mod schema;

pub use envelope::Envelope;
pub use error::ProtocolError;
pub use schema::{FieldKind, PayloadSchema, SchemaViolations};
