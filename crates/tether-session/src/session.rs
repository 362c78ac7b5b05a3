//! The session: owner of one authenticated, bidirectional connection.
//!
//! A session is always handled as `Arc<Session<C>>`. Its life:
//!
//! ```text
//!   accept ──→ Session::spawn ──→ [Unauthenticated]
//!                                      │ authenticate
//!                                      ▼
//!                                 [Authenticated] ──(expiry timer)──→ [Unauthenticated]
//!                                      │                                   │
//!                                      └───────── transport close ─────────┘
//!                                                      ▼
//!                                                  [Closed]
//! ```
//!
//! Closed is terminal and reached only through transport close (clean,
//! errored, or forced). Token expiry is a soft transition: it flips the
//! `authenticated` flag and nothing else — the identity stays pinned.
//!
//! # Concurrency
//!
//! Frames are read off the transport in arrival order, but each frame
//! is dispatched on its own task without awaiting the previous one.
//! Handler callbacks for the same session can therefore run
//! concurrently and complete out of arrival order. This is a deliberate
//! property of the protocol, not an accident; handlers must be safe
//! under concurrent invocation.
//!
//! Lock policy: auth state and timer handles live behind synchronous
//! `parking_lot` mutexes that are never held across an await. The
//! transport sink carries its own async lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tether_protocol::Envelope;
use tether_transport::{Connection, HandshakeContext, Inbound};

use crate::{
    MessageHandler, SessionConfig, SessionError, SessionRegistry, TaskHandle,
    TokenVerifier,
};

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn generate() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identity and auth state
// ---------------------------------------------------------------------------

/// The identity a session is pinned to after its first successful
/// authentication. Immutable for the life of the session: a later
/// authentication for a different subject is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub device_id: Option<String>,
    pub token_id: Option<String>,
    /// Audience claim, normalized to a list at authentication time.
    pub audiences: Vec<String>,
}

#[derive(Debug, Default)]
struct AuthState {
    authenticated: bool,
    identity: Option<Identity>,
}

/// The renew-reminder and expiry timers.
///
/// Invariant: both unset or both set, and replaced as a pair under one
/// lock on every successful (re)authentication.
#[derive(Debug, Default)]
struct AuthTimers {
    renew: Option<TaskHandle>,
    expire: Option<TaskHandle>,
}

impl AuthTimers {
    fn replace(&mut self, renew: TaskHandle, expire: TaskHandle) {
        self.clear();
        self.renew = Some(renew);
        self.expire = Some(expire);
    }

    fn clear(&mut self) {
        if let Some(renew) = self.renew.take() {
            renew.cancel();
        }
        if let Some(expire) = self.expire.take() {
            expire.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle hooks
// ---------------------------------------------------------------------------

/// A lifecycle callback (on-create, on-auth, or on-close).
pub type SessionCallback<C> = Arc<
    dyn Fn(Arc<Session<C>>) -> BoxFuture<'static, Result<(), SessionError>>
        + Send
        + Sync,
>;

/// Ordered lists of lifecycle callbacks. Normalized to lists here at
/// the edge; nothing downstream deals in "one callback or many".
pub struct SessionHooks<C: Connection> {
    pub(crate) on_create: Vec<SessionCallback<C>>,
    pub(crate) on_auth: Vec<SessionCallback<C>>,
    pub(crate) on_close: Vec<SessionCallback<C>>,
}

impl<C: Connection> Default for SessionHooks<C> {
    fn default() -> Self {
        Self {
            on_create: Vec::new(),
            on_auth: Vec::new(),
            on_close: Vec::new(),
        }
    }
}

impl<C: Connection> Clone for SessionHooks<C> {
    fn clone(&self) -> Self {
        Self {
            on_create: self.on_create.clone(),
            on_auth: self.on_auth.clone(),
            on_close: self.on_close.clone(),
        }
    }
}

impl<C: Connection> SessionHooks<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback run when a session is established.
    pub fn on_create<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Session<C>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), SessionError>>
            + Send
            + 'static,
    {
        self.on_create
            .push(Arc::new(move |session| Box::pin(callback(session))));
        self
    }

    /// Appends a callback run after each successful authentication.
    pub fn on_auth<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Session<C>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), SessionError>>
            + Send
            + 'static,
    {
        self.on_auth
            .push(Arc::new(move |session| Box::pin(callback(session))));
        self
    }

    /// Appends a callback run when a session closes.
    pub fn on_close<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Session<C>>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), SessionError>>
            + Send
            + 'static,
    {
        self.on_close
            .push(Arc::new(move |session| Box::pin(callback(session))));
        self
    }
}

/// Everything a session is constructed with besides the connection.
pub struct SessionOptions<C: Connection> {
    pub handlers: Vec<MessageHandler<C>>,
    pub hooks: SessionHooks<C>,
}

impl<C: Connection> Default for SessionOptions<C> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            hooks: SessionHooks::default(),
        }
    }
}

impl<C: Connection> Clone for SessionOptions<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// SendOptions
// ---------------------------------------------------------------------------

/// Options for [`Session::send_message`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Deliver regardless of authentication and audience. Used by the
    /// built-in pushes (`pong`, `error`, `renewAuthentication`).
    pub no_auth: bool,

    /// The audience this message is scoped to. `None` means the
    /// configured default audience.
    pub audience: Option<String>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that bypass the auth/audience gate.
    pub fn bypass_auth() -> Self {
        Self {
            no_auth: true,
            audience: None,
        }
    }

    /// Options scoped to a specific audience.
    pub fn to_audience(audience: impl Into<String>) -> Self {
        Self {
            no_auth: false,
            audience: Some(audience.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connected peer: connection, identity, liveness, timers.
pub struct Session<C: Connection> {
    id: SessionId,
    created_at: SystemTime,
    handshake: HandshakeContext,
    conn: C,
    config: SessionConfig,
    verifier: Arc<dyn TokenVerifier>,
    handlers: Vec<MessageHandler<C>>,
    hooks: SessionHooks<C>,
    registry: Arc<SessionRegistry<C>>,
    auth: Mutex<AuthState>,
    timers: Mutex<AuthTimers>,
    probe: Mutex<Option<TaskHandle>>,
    /// Liveness flag: set by inbound pongs, cleared by each probe tick.
    alive: AtomicBool,
    /// Teardown guard: flipped exactly once.
    closed: AtomicBool,
}

impl<C: Connection> Session<C> {
    /// Creates a session for an accepted connection and starts its
    /// machinery: registry entry, read loop, liveness probe, on-create
    /// callbacks.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidHandler`] if any supplied binding
    /// is malformed. Fatal: nothing is registered or spawned.
    pub fn spawn(
        conn: C,
        handshake: HandshakeContext,
        options: SessionOptions<C>,
        verifier: Arc<dyn TokenVerifier>,
        registry: Arc<SessionRegistry<C>>,
        config: SessionConfig,
    ) -> Result<Arc<Self>, SessionError> {
        for handler in &options.handlers {
            handler.validate_shape()?;
        }

        let session = Arc::new(Self {
            id: SessionId::generate(),
            created_at: SystemTime::now(),
            handshake,
            conn,
            config,
            verifier,
            handlers: options.handlers,
            hooks: options.hooks,
            registry,
            auth: Mutex::new(AuthState::default()),
            timers: Mutex::new(AuthTimers::default()),
            probe: Mutex::new(None),
            // The peer just completed a handshake; it gets a full probe
            // period before the first liveness judgment.
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        });

        session.registry.insert(&session);
        tracing::info!(
            id = %session.id,
            remote = %session.handshake.remote_addr,
            "session created"
        );

        let reader = Arc::clone(&session);
        tokio::spawn(async move { reader.read_loop().await });

        let prober = Arc::clone(&session);
        *session.probe.lock() =
            Some(TaskHandle::spawn(async move { prober.probe_loop().await }));

        let creator = Arc::clone(&session);
        tokio::spawn(async move {
            let hooks = creator.hooks.on_create.clone();
            creator.run_hooks(hooks, "create").await;
        });

        Ok(session)
    }

    // -- Accessors ---------------------------------------------------------

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn handshake(&self) -> &HandshakeContext {
        &self.handshake
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.lock().authenticated
    }

    /// The pinned identity, or `None` if the session never
    /// authenticated. Still `Some` after token expiry — expiry clears
    /// the flag, not the pin.
    pub fn user(&self) -> Option<Identity> {
        self.auth.lock().identity.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // -- Event loops -------------------------------------------------------

    /// Reads inbound events until the connection closes. Each text
    /// frame is dispatched fire-and-forget on its own task.
    async fn read_loop(self: Arc<Self>) {
        loop {
            match self.conn.recv().await {
                Ok(Some(Inbound::Text(raw))) => {
                    let session = Arc::clone(&self);
                    tokio::spawn(async move { session.dispatch(raw).await });
                }
                Ok(Some(Inbound::Pong)) => {
                    tracing::trace!(id = %self.id, "liveness pong");
                    self.alive.store(true, Ordering::SeqCst);
                }
                Ok(None) => break,
                // Transport-level errors are logged only; they do not
                // close the connection from this side. If the link is
                // truly gone the stream ends or the probe reaps it.
                Err(e) => {
                    tracing::warn!(id = %self.id, error = %e, "transport error");
                }
            }
        }
        self.teardown().await;
    }

    /// The recurring liveness probe. A peer that leaves a full period
    /// without answering is terminated on the next tick.
    async fn probe_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.ping_interval);
        ticker.set_missed_tick_behavior(
            tokio::time::MissedTickBehavior::Delay,
        );
        // The first tick of a Tokio interval completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !self.alive.load(Ordering::SeqCst) {
                tracing::warn!(
                    id = %self.id,
                    "liveness probe unanswered, terminating connection"
                );
                self.conn.terminate().await;
                break;
            }
            self.alive.store(false, Ordering::SeqCst);
            if let Err(e) = self.conn.ping().await {
                // The close will surface through the read loop.
                tracing::debug!(id = %self.id, error = %e, "liveness ping failed");
            }
        }
    }

    // -- Dispatch ----------------------------------------------------------

    /// Dispatches one raw frame. This is the single catch point of the
    /// dispatch path: every error below it becomes an `error` push, and
    /// none of them terminates the connection.
    pub async fn dispatch(self: &Arc<Self>, raw: String) {
        if let Err(e) = self.dispatch_frame(&raw).await {
            self.push_error(&e).await;
        }
    }

    async fn dispatch_frame(
        self: &Arc<Self>,
        raw: &str,
    ) -> Result<(), SessionError> {
        let envelope = Envelope::parse(raw)?;
        match envelope.kind.as_str() {
            "authenticate" => self.authenticate(&envelope.payload).await,
            // The application-level heartbeat, for peers that cannot
            // use transport control frames. Independent of the
            // transport-level probe.
            "ping" => {
                self.send_message("pong", Value::Null, SendOptions::bypass_auth())
                    .await
            }
            _ => {
                for handler in &self.handlers {
                    handler.handle(&envelope, self).await?;
                }
                Ok(())
            }
        }
    }

    /// Reports a dispatch failure to the peer as an `error` push.
    async fn push_error(&self, error: &SessionError) {
        if error.is_client_error() {
            tracing::debug!(id = %self.id, error = %error, "client error");
        } else {
            // Full detail stays server-side; the peer sees a generic
            // code with a null hint.
            tracing::error!(id = %self.id, error = %error, "dispatch failed");
        }

        let payload = json!({
            "errorCode": error.code(),
            "hint": error.hint(),
        });
        if let Err(send_error) = self
            .send_message("error", payload, SendOptions::bypass_auth())
            .await
        {
            tracing::debug!(
                id = %self.id,
                error = %send_error,
                "failed to push error to peer"
            );
        }
    }

    // -- Authentication ----------------------------------------------------

    async fn authenticate(
        self: &Arc<Self>,
        payload: &Value,
    ) -> Result<(), SessionError> {
        let token = payload
            .get("token")
            .and_then(Value::as_str)
            .ok_or(SessionError::NoToken)?;

        let claims = self.verifier.verify(token).await?;

        {
            let mut auth = self.auth.lock();
            match &auth.identity {
                Some(identity) => {
                    // Identity pinning: the first authentication bound
                    // this session to a subject, permanently.
                    if identity.user_id != claims.sub {
                        return Err(SessionError::WrongUser);
                    }
                }
                None => {
                    auth.identity = Some(Identity {
                        user_id: claims.sub.clone(),
                        device_id: claims.dev.clone(),
                        token_id: claims.jti.clone(),
                        audiences: claims.aud.clone().into_list(),
                    });
                }
            }
            auth.authenticated = true;
        }

        self.schedule_auth_timers(claims.exp);
        tracing::info!(id = %self.id, user = %claims.sub, "session authenticated");

        let hooks = self.hooks.on_auth.clone();
        self.run_hooks(hooks, "auth").await;
        Ok(())
    }

    /// Replaces the renew/expire pair for a token expiring at `exp`
    /// (unix seconds). Old timers are cancelled and new ones installed
    /// under a single lock, so the pair is never half-swapped.
    fn schedule_auth_timers(self: &Arc<Self>, exp: u64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let until_expiry = Duration::from_secs(exp.saturating_sub(now));
        let renew_after = until_expiry.saturating_sub(self.config.renew_lead);

        let renewer = Arc::clone(self);
        let renew = TaskHandle::spawn_after(renew_after, async move {
            if let Err(e) = renewer
                .send_message(
                    "renewAuthentication",
                    Value::Null,
                    SendOptions::bypass_auth(),
                )
                .await
            {
                tracing::debug!(
                    id = %renewer.id,
                    error = %e,
                    "failed to push renew reminder"
                );
            }
        });

        let expirer = Arc::clone(self);
        let expire = TaskHandle::spawn_after(until_expiry, async move {
            expirer.auth.lock().authenticated = false;
            tracing::debug!(id = %expirer.id, "authentication expired");
        });

        self.timers.lock().replace(renew, expire);
    }

    // -- Outbound ----------------------------------------------------------

    /// Sends a `{type, payload}` envelope to the peer, subject to the
    /// delivery gate.
    ///
    /// Without `no_auth`, delivery requires the session to be
    /// authenticated *and* its pinned audience list to contain the
    /// requested audience (the configured default when the options name
    /// none). A message that fails the gate is silently dropped and the
    /// call still returns `Ok` — callers cannot tell "dropped" from
    /// "delivered" without peer confirmation.
    pub async fn send_message(
        &self,
        kind: &str,
        payload: Value,
        options: SendOptions,
    ) -> Result<(), SessionError> {
        if !options.no_auth {
            let audience = options
                .audience
                .as_deref()
                .unwrap_or(&self.config.default_audience);
            let allowed = {
                let auth = self.auth.lock();
                auth.authenticated
                    && auth
                        .identity
                        .as_ref()
                        .is_some_and(|i| i.audiences.iter().any(|a| a == audience))
            };
            if !allowed {
                tracing::trace!(
                    id = %self.id,
                    kind,
                    audience,
                    "send suppressed by auth/audience gate"
                );
                return Ok(());
            }
        }

        let text = Envelope::new(kind, payload).to_text()?;
        self.conn
            .send_text(&text)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    // -- Close -------------------------------------------------------------

    /// Asks the peer to close (graceful close handshake). The session
    /// tears down when the close completes and the read loop ends.
    pub async fn request_close(&self) {
        if let Err(e) = self.conn.close().await {
            tracing::debug!(id = %self.id, error = %e, "close request failed");
        }
    }

    /// Terminates the connection unconditionally.
    pub async fn force_close(&self) {
        self.conn.terminate().await;
    }

    /// Final teardown: deregister, cancel all scheduled tasks, run
    /// close callbacks. Idempotent — a second call is a no-op, so a
    /// double close never runs callbacks twice.
    pub async fn teardown(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.registry.remove(self.id);
        self.timers.lock().clear();
        if let Some(probe) = self.probe.lock().take() {
            probe.cancel();
        }
        tracing::info!(id = %self.id, "session closed");

        // Close callbacks run detached so teardown completion never
        // waits on application code.
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let hooks = session.hooks.on_close.clone();
            session.run_hooks(hooks, "close").await;
        });
    }

    // -- Hooks -------------------------------------------------------------

    /// Runs one phase's callbacks concurrently. Each failure is logged
    /// and isolated; no callback can abort the phase.
    async fn run_hooks(
        self: &Arc<Self>,
        hooks: Vec<SessionCallback<C>>,
        phase: &'static str,
    ) {
        if hooks.is_empty() {
            return;
        }
        let futures = hooks.into_iter().map(|hook| {
            let session = Arc::clone(self);
            async move {
                if let Err(e) = hook(session).await {
                    tracing::warn!(
                        phase,
                        error = %e,
                        "lifecycle callback failed"
                    );
                }
            }
        });
        futures_util::future::join_all(futures).await;
    }
}
