//! Concurrent hub-to-session map with last-writer-wins eviction.
//!
//! [`HubRegistry`] stores the single active [`Session`] for each hub in a
//! `HashMap` behind a [`tokio::sync::RwLock`]. Registration and removal
//! take the write lock, so a newer connection and a stale disconnect
//! handler can never interleave.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::HubId;
use super::session::{CloseReason, Session, SessionState, SessionSummary};
use crate::error::GatewayError;

/// Outcome of [`HubRegistry::register`].
#[derive(Debug)]
pub struct Registration {
    /// The newly installed, now `Active`, session.
    pub session: Arc<Session>,
    /// The session it replaced, already moved to `Closing`.
    pub evicted: Option<Arc<Session>>,
}

/// Central store of live hub sessions.
///
/// # Concurrency
///
/// - Lookups take the read lock and return a cloned `Arc<Session>`.
/// - `register` / `unregister` take the write lock, making eviction and
///   compare-and-remove atomic with respect to each other.
#[derive(Debug)]
pub struct HubRegistry {
    sessions: RwLock<HashMap<HubId, Arc<Session>>>,
}

impl HubRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Installs `session` as the active session for its hub.
    ///
    /// Any previous session for the same hub is moved to `Closing` with
    /// [`CloseReason::Evicted`] before the new one becomes `Active`; its
    /// connection loop observes the change and drops the socket.
    pub async fn register(&self, session: Arc<Session>) -> Registration {
        let mut map = self.sessions.write().await;
        let evicted = map.remove(session.hub_id());
        if let Some(previous) = &evicted {
            previous.begin_close(CloseReason::Evicted);
        }
        session.advance(SessionState::Active);
        map.insert(session.hub_id().clone(), Arc::clone(&session));
        Registration { session, evicted }
    }

    /// Returns the active session for `hub_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HubNotConnected`] if no session is
    /// registered or the registered one is already closing.
    pub async fn lookup(&self, hub_id: &HubId) -> Result<Arc<Session>, GatewayError> {
        let map = self.sessions.read().await;
        map.get(hub_id)
            .filter(|session| session.state() == SessionState::Active)
            .cloned()
            .ok_or_else(|| GatewayError::HubNotConnected(hub_id.clone()))
    }

    /// Removes the mapping for `session`'s hub only if it still points at
    /// this exact session.
    ///
    /// Returns `true` if the mapping was removed.
    pub async fn unregister(&self, session: &Session) -> bool {
        let mut map = self.sessions.write().await;
        let is_current = map
            .get(session.hub_id())
            .is_some_and(|current| current.id() == session.id());
        if is_current {
            map.remove(session.hub_id());
        }
        is_current
    }

    /// Returns summaries of all registered sessions, sorted by hub id.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let map = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = map.values().map(|s| s.summary()).collect();
        summaries.sort_by(|a, b| a.hub_id.cmp(&b.hub_id));
        summaries
    }

    /// Moves every registered session to `Closing` with `reason`.
    ///
    /// Entries stay in the map until each connection loop finishes its
    /// teardown. Returns the number of sessions signalled.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let map = self.sessions.read().await;
        map.values()
            .filter(|session| session.begin_close(reason))
            .count()
    }

    /// Returns the number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no hub is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for HubRegistry {
    fn default() -> Self {
        Self::new()
    }
}
