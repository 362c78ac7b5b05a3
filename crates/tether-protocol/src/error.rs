//! Error types for the protocol layer.

/// Errors that can occur while parsing or serializing envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The inbound frame is not a usable message.
    ///
    /// Covers malformed JSON, and well-formed JSON whose top-level value
    /// is not a plain object (arrays, scalars, `null`, empty input).
    /// The peer sees this as the `non-json` error code — one kind, on
    /// purpose: clients get no parser detail to depend on.
    #[error("message is not a JSON object")]
    NonJson,

    /// Serializing an outbound envelope failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}
