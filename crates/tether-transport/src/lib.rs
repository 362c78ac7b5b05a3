//! Transport abstraction layer for Tether.
//!
//! Provides the [`Transport`] and [`Connection`] traits that the session
//! core is written against, plus the default WebSocket implementation.
//! A connection is message-oriented and bidirectional: it yields
//! application text frames and transport-level liveness answers
//! ([`Inbound`]), and it can be closed two ways — a graceful close
//! handshake ([`Connection::close`]) or an unconditional termination
//! ([`Connection::terminate`]) for dead peers and shutdown deadlines.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Facts captured during the connection handshake, before any
/// application frame flows. Handed to the session at construction.
#[derive(Debug, Clone)]
pub struct HandshakeContext {
    /// The peer's socket address.
    pub remote_addr: SocketAddr,
}

/// An inbound event from a connection.
///
/// The session core cares about exactly two things arriving from the
/// wire: application frames and answers to its liveness probes. All
/// other control traffic is the transport's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// An application-level text frame (a JSON envelope, at this layer
    /// just opaque text).
    Text(String),

    /// The peer answered a liveness probe sent via [`Connection::ping`].
    Pong,
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<(Self::Connection, HandshakeContext), Self::Error>>
    + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A single message-oriented connection.
///
/// All futures are `Send` so the session core can drive a connection
/// from spawned tasks: one task receives while others send.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends an application text frame to the peer.
    fn send_text(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Sends a transport-level liveness probe. The answer, if any,
    /// arrives as [`Inbound::Pong`] from [`recv`](Self::recv).
    fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next inbound event.
    ///
    /// Returns `Ok(None)` when the connection is closed — cleanly, by
    /// the peer, or via [`terminate`](Self::terminate).
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Inbound>, Self::Error>> + Send;

    /// Starts a graceful close handshake.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Terminates the connection unconditionally.
    ///
    /// Infallible and immediate: marks the connection dead and wakes any
    /// pending `recv` with `Ok(None)`. Used when the peer has stopped
    /// answering liveness probes, or when a shutdown grace period runs
    /// out.
    fn terminate(&self) -> impl Future<Output = ()> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
