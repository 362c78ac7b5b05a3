//! The live-session registry.
//!
//! One registry per server, owned by whoever accepts connections and
//! handed to each session at construction. Entries are weak: the
//! registry can observe and broadcast to sessions but never keeps one
//! alive, so a session whose tasks have all finished is reclaimed even
//! if a teardown notification was lost.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tether_transport::Connection;

use crate::session::{Session, SessionId};

/// Weak map of every open session.
pub struct SessionRegistry<C: Connection> {
    sessions: Mutex<HashMap<SessionId, Weak<Session<C>>>>,
}

impl<C: Connection> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> SessionRegistry<C> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, session: &Arc<Session<C>>) {
        self.sessions
            .lock()
            .insert(session.id(), Arc::downgrade(session));
    }

    pub(crate) fn remove(&self, id: SessionId) {
        self.sessions.lock().remove(&id);
    }

    /// Looks up a session by ID. `None` if it closed or was dropped.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session<C>>> {
        self.sessions.lock().get(&id).and_then(Weak::upgrade)
    }

    /// Snapshot of all currently live sessions.
    pub fn list(&self) -> Vec<Arc<Session<C>>> {
        self.sessions
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Number of registered sessions, counting any that are dead but
    /// not yet removed.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Two-phase shutdown of every live session: request a graceful
    /// close, wait out the grace period, then terminate stragglers.
    ///
    /// Returns when the grace period has elapsed and terminations have
    /// been issued. Stragglers finish their teardown on their own read
    /// loops shortly after.
    pub async fn shutdown(&self, grace: Duration) {
        let sessions = self.list();
        tracing::info!(count = sessions.len(), "shutting down sessions");

        for session in &sessions {
            session.request_close().await;
        }

        tokio::time::sleep(grace).await;

        for session in &sessions {
            if !session.is_closed() {
                tracing::warn!(
                    id = %session.id(),
                    "session did not close within grace period, terminating"
                );
                session.force_close().await;
            }
        }
    }
}
