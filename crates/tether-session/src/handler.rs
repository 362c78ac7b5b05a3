//! Handler bindings: the static association between a message type, a
//! payload schema, an auth requirement, and a business callback.
//!
//! Bindings are created at server configuration time and never mutated.
//! Each inbound non-built-in envelope is offered to every binding in
//! registration order.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tether_protocol::{Envelope, PayloadSchema};
use tether_transport::Connection;

use crate::session::Session;
use crate::SessionError;

/// Message types claimed by the session core itself. A binding may not
/// shadow them.
pub(crate) const RESERVED_TYPES: [&str; 2] = ["authenticate", "ping"];

/// The boxed business callback a binding invokes on a match.
pub type HandlerCallback<C> = Arc<
    dyn Fn(Value, Arc<Session<C>>) -> BoxFuture<'static, Result<(), SessionError>>
        + Send
        + Sync,
>;

/// An immutable `(type, schema, auth requirement, callback)` binding.
pub struct MessageHandler<C: Connection> {
    message_type: String,
    schema: PayloadSchema,
    requires_auth: bool,
    callback: HandlerCallback<C>,
}

// Manual impl: `#[derive(Clone)]` would demand `C: Clone`, which the
// connection type has no reason to be.
impl<C: Connection> Clone for MessageHandler<C> {
    fn clone(&self) -> Self {
        Self {
            message_type: self.message_type.clone(),
            schema: self.schema.clone(),
            requires_auth: self.requires_auth,
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<C: Connection> MessageHandler<C> {
    /// Creates a binding for `message_type`. Authentication is required
    /// by default; see [`allow_unauthenticated`](Self::allow_unauthenticated).
    pub fn new<F, Fut>(
        message_type: impl Into<String>,
        schema: PayloadSchema,
        callback: F,
    ) -> Self
    where
        F: Fn(Value, Arc<Session<C>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), SessionError>>
            + Send
            + 'static,
    {
        Self {
            message_type: message_type.into(),
            schema,
            requires_auth: true,
            callback: Arc::new(move |payload, session| {
                Box::pin(callback(payload, session))
            }),
        }
    }

    /// Lets this binding fire for unauthenticated sessions.
    pub fn allow_unauthenticated(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// The message type this binding matches.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Whether this binding requires an authenticated session.
    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    /// Checks that the binding is well-formed. Called once at session
    /// construction; a failure there is fatal (no session is created).
    pub(crate) fn validate_shape(&self) -> Result<(), SessionError> {
        if self.message_type.is_empty() {
            return Err(SessionError::InvalidHandler(
                "handler message type must not be empty".into(),
            ));
        }
        if RESERVED_TYPES.contains(&self.message_type.as_str()) {
            return Err(SessionError::InvalidHandler(format!(
                "message type {:?} is reserved for built-in behavior",
                self.message_type
            )));
        }
        Ok(())
    }

    /// Offers an envelope to this binding.
    ///
    /// Order is deliberate and preserved from the system this replaces:
    /// the schema runs against **every** envelope that reaches the
    /// binding list, *before* the type check. A frame of type "b" can
    /// therefore fail validation against a binding for type "a". Do not
    /// reorder without coordinating a protocol-level change with
    /// clients that depend on the current rejects.
    pub async fn handle(
        &self,
        envelope: &Envelope,
        session: &Arc<Session<C>>,
    ) -> Result<(), SessionError> {
        self.schema
            .validate(&envelope.payload)
            .map_err(SessionError::Validation)?;

        if envelope.kind != self.message_type {
            return Ok(());
        }

        if self.requires_auth && !session.is_authenticated() {
            tracing::debug!(
                session = %session.id(),
                message_type = %self.message_type,
                "dropping message from unauthenticated session"
            );
            return Ok(());
        }

        (self.callback)(envelope.payload.clone(), Arc::clone(session)).await
    }
}
