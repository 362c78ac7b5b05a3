//! `Server` builder and accept loop.
//!
//! This is the entry point for running a Tether server. It ties
//! together all the layers: transport → protocol → session.

use std::sync::Arc;

use tether_session::{
    MessageHandler, Session, SessionConfig, SessionHooks, SessionOptions,
    SessionRegistry, TokenVerifier,
};
use tether_transport::{Transport, WebSocketConnection, WebSocketTransport};

use crate::TetherError;

/// Builder for configuring and starting a Tether server.
///
/// # Example
///
/// ```rust,ignore
/// use tether::prelude::*;
///
/// let server = Server::builder()
///     .bind("0.0.0.0:8080")
///     .handler(MessageHandler::new("note", schema, handle_note))
///     .build(JwtVerifier::hs256(secret))
///     .await?;
/// server.run().await
/// ```
pub struct ServerBuilder {
    bind_addr: String,
    config: SessionConfig,
    handlers: Vec<MessageHandler<WebSocketConnection>>,
    hooks: SessionHooks<WebSocketConnection>,
}

impl ServerBuilder {
    /// Creates a new builder with default settings and configuration
    /// from the environment.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: SessionConfig::from_env(),
            handlers: Vec::new(),
            hooks: SessionHooks::new(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Replaces the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a message handler binding. Every session accepted by
    /// the server carries every registered binding, in registration
    /// order.
    pub fn handler(mut self, handler: MessageHandler<WebSocketConnection>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Appends a session-created lifecycle callback.
    pub fn on_create<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Session<WebSocketConnection>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), tether_session::SessionError>>
            + Send
            + 'static,
    {
        self.hooks = self.hooks.on_create(callback);
        self
    }

    /// Appends an authenticated lifecycle callback.
    pub fn on_auth<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Session<WebSocketConnection>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), tether_session::SessionError>>
            + Send
            + 'static,
    {
        self.hooks = self.hooks.on_auth(callback);
        self
    }

    /// Appends a session-closed lifecycle callback.
    pub fn on_close<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Session<WebSocketConnection>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), tether_session::SessionError>>
            + Send
            + 'static,
    {
        self.hooks = self.hooks.on_close(callback);
        self
    }

    /// Binds the listener and builds the server with the given token
    /// verifier.
    pub async fn build(
        self,
        verifier: impl TokenVerifier + 'static,
    ) -> Result<Server, TetherError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        Ok(Server {
            transport,
            registry: Arc::new(SessionRegistry::new()),
            options: SessionOptions {
                handlers: self.handlers,
                hooks: self.hooks,
            },
            verifier: Arc::new(verifier),
            config: self.config,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Tether server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct Server {
    transport: WebSocketTransport,
    registry: Arc<SessionRegistry<WebSocketConnection>>,
    options: SessionOptions<WebSocketConnection>,
    verifier: Arc<dyn TokenVerifier>,
    config: SessionConfig,
}

impl Server {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry of live sessions, for broadcasting or inspection
    /// from outside the accept loop.
    pub fn registry(&self) -> Arc<SessionRegistry<WebSocketConnection>> {
        Arc::clone(&self.registry)
    }

    /// Runs the server accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), TetherError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then closes
    /// every live session: a graceful close request first, a forced
    /// termination for sessions still open after the configured grace
    /// period.
    pub async fn run_until(
        mut self,
        shutdown: impl std::future::Future<Output = ()>,
    ) -> Result<(), TetherError> {
        tracing::info!("tether server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok((conn, handshake)) => {
                        let spawned = Session::spawn(
                            conn,
                            handshake,
                            self.options.clone(),
                            Arc::clone(&self.verifier),
                            Arc::clone(&self.registry),
                            self.config.clone(),
                        );
                        // A spawn failure means a misconfigured handler
                        // binding; the connection is dropped and the
                        // server keeps accepting.
                        if let Err(e) = spawned {
                            tracing::error!(
                                error = %e,
                                "failed to establish session"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("tether server shutting down");
        self.transport.shutdown().await?;
        self.registry.shutdown(self.config.shutdown_grace).await;
        Ok(())
    }
}
