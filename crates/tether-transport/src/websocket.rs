//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The stream is split at accept time: the sink side lives behind an
//! async mutex so any task can send, while the stream side is only ever
//! polled by the session's read loop. Without the split, a pending
//! `recv` would hold the connection lock and starve every send.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    Connection, ConnectionId, HandshakeContext, Inbound, Transport,
    TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(
        &mut self,
    ) -> Result<(Self::Connection, HandshakeContext), Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let id =
            ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        let (terminated_tx, terminated_rx) = watch::channel(false);

        Ok((
            WebSocketConnection {
                id,
                sink: Mutex::new(sink),
                stream: Mutex::new(stream),
                terminated_tx,
                terminated_rx,
            },
            HandshakeContext { remote_addr: addr },
        ))
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    /// Flipped exactly once by [`terminate`](Connection::terminate).
    /// A watch channel (not a bare flag) so a pending `recv` wakes up
    /// without racing against the flag check.
    terminated_tx: watch::Sender<bool>,
    terminated_rx: watch::Receiver<bool>,
}

impl WebSocketConnection {
    fn send_error(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
        TransportError::SendFailed(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            e,
        ))
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send_text(&self, text: &str) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .send(Message::text(text))
            .await
            .map_err(Self::send_error)
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(Self::send_error)
    }

    async fn recv(&self) -> Result<Option<Inbound>, Self::Error> {
        let mut terminated = self.terminated_rx.clone();
        loop {
            if *terminated.borrow() {
                return Ok(None);
            }

            let mut stream = self.stream.lock().await;
            let next = tokio::select! {
                _ = terminated.changed() => return Ok(None),
                msg = stream.next() => msg,
            };
            drop(stream);

            match next {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Inbound::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Pong(_))) => return Ok(Some(Inbound::Pong)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Binary frames are not part of the protocol; inbound
                // Pings are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .send(Message::Close(None))
            .await
            .map_err(Self::send_error)
    }

    async fn terminate(&self) {
        // Wake any pending recv first, then try to flush a close frame
        // on the way out. Errors are irrelevant — the peer is presumed
        // gone.
        self.terminated_tx.send_replace(true);
        let _ = self.sink.lock().await.close().await;
        tracing::debug!(id = %self.id, "connection terminated");
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
