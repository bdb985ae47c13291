//! Server-side state of one hub's live connection.
//!
//! A [`Session`] is created when a device presents its handshake, owned by
//! the [`super::HubRegistry`] while it is active, and torn down on
//! disconnect, heartbeat timeout, eviction or shutdown. Its lifecycle state
//! lives in a [`tokio::sync::watch`] channel so that the connection loop
//! observes eviction and shutdown without polling.

use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc, watch};
use utoipa::ToSchema;

use super::HubId;
use super::command::CommandFailure;
use super::port::{PortEvent, PortInfo, PortTable};

/// Server-assigned identifier distinguishing two connections of one hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Creates a new random `SessionId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a session. Variants are ordered; transitions only move
/// forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Handshake received, token not yet validated.
    Connecting,
    /// Token validated, not yet installed in the registry.
    Authenticated,
    /// Installed in the registry and accepting commands.
    Active,
    /// Teardown in progress.
    Closing,
    /// Channel released, pending commands failed, registry entry removed.
    Closed,
}

impl SessionState {
    /// Returns `true` for `Closing` and `Closed`.
    #[must_use]
    pub fn is_closing(self) -> bool {
        self >= Self::Closing
    }
}

/// Why a session left the `Active` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The device closed the connection or the transport failed.
    RemoteDisconnect,
    /// No inbound traffic within the heartbeat window.
    HeartbeatTimeout,
    /// A newer connection claimed the same hub identifier.
    Evicted,
    /// The server is shutting down.
    Shutdown,
    /// Authentication failed during the handshake.
    Rejected,
}

impl CloseReason {
    /// Returns the reason as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoteDisconnect => "remote_disconnect",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Evicted => "evicted",
            Self::Shutdown => "shutdown",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest health metrics pushed by a hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthSnapshot {
    /// Server time at which the snapshot arrived.
    pub received_at: DateTime<Utc>,
    /// Hub process uptime, if reported.
    pub uptime_seconds: Option<u64>,
    /// System metrics (cpu, memory, disk).
    #[schema(value_type = Object)]
    pub system: serde_json::Value,
    /// Hub service metrics.
    #[schema(value_type = Object)]
    pub service: serde_json::Value,
    /// Error counters.
    #[schema(value_type = Object)]
    pub errors: serde_json::Value,
}

/// One hub's live connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    hub_id: HubId,
    version: String,
    remote_addr: Option<String>,
    connected_at: DateTime<Utc>,
    last_seen_ms: AtomicI64,
    state: watch::Sender<SessionState>,
    close_reason: OnceLock<CloseReason>,
    outbound: mpsc::Sender<String>,
    health: RwLock<Option<HealthSnapshot>>,
    ports: RwLock<PortTable>,
}

impl Session {
    /// Creates a session in the `Connecting` state.
    ///
    /// `outbound` is the queue drained by the connection's writer; every
    /// frame for the device goes through it.
    #[must_use]
    pub fn new(
        hub_id: HubId,
        version: String,
        remote_addr: Option<String>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        let now = Utc::now();
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id: SessionId::new(),
            hub_id,
            version,
            remote_addr,
            connected_at: now,
            last_seen_ms: AtomicI64::new(now.timestamp_millis()),
            state,
            close_reason: OnceLock::new(),
            outbound,
            health: RwLock::new(None),
            ports: RwLock::new(PortTable::default()),
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the hub this session belongs to.
    #[must_use]
    pub const fn hub_id(&self) -> &HubId {
        &self.hub_id
    }

    /// Returns the firmware/service version announced in the handshake.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the peer address, when known.
    #[must_use]
    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    /// Returns the handshake time.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Moves the session forward to `next`.
    ///
    /// Returns `false` (and changes nothing) if the session is already at
    /// or past `next`.
    pub fn advance(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    /// Records `reason` (first one wins) and moves the session to `Closing`.
    ///
    /// Returns `true` if this call started the teardown.
    pub fn begin_close(&self, reason: CloseReason) -> bool {
        let _ = self.close_reason.set(reason);
        self.advance(SessionState::Closing)
    }

    /// Returns the reason recorded by the first [`Self::begin_close`].
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Marks inbound traffic; any frame counts as a heartbeat.
    pub fn touch(&self) {
        self.last_seen_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Returns the time of the last inbound frame.
    #[must_use]
    pub fn last_heartbeat_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_seen_ms.load(Ordering::Relaxed))
            .unwrap_or(self.connected_at)
    }

    /// Hands an encoded frame to the connection's outbound queue.
    ///
    /// Never waits: a full queue or a closed writer fails immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CommandFailure::SendFailed`] if the session is not active,
    /// the queue is full, or the writer has gone away.
    pub fn send_frame(&self, frame: String) -> Result<(), CommandFailure> {
        if self.state() != SessionState::Active {
            return Err(CommandFailure::SendFailed);
        }
        self.outbound
            .try_send(frame)
            .map_err(|_| CommandFailure::SendFailed)
    }

    /// Stores the latest health snapshot.
    pub async fn record_health(&self, snapshot: HealthSnapshot) {
        *self.health.write().await = Some(snapshot);
    }

    /// Returns the latest health snapshot, if any arrived.
    pub async fn health(&self) -> Option<HealthSnapshot> {
        self.health.read().await.clone()
    }

    /// Applies a port event reported by the hub. Returns `false` if it
    /// changed nothing.
    pub async fn apply_port_event(&self, event: &PortEvent) -> bool {
        self.ports.write().await.apply(event, Utc::now())
    }

    /// Ports currently attached to the hub.
    pub async fn ports(&self) -> Vec<PortInfo> {
        self.ports.read().await.list()
    }

    /// Returns a point-in-time summary for listing endpoints.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from(self)
    }
}

/// Snapshot of a session for list and detail endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Hub identifier.
    pub hub_id: HubId,
    /// Session identifier.
    pub session_id: SessionId,
    /// State at snapshot time.
    pub state: SessionState,
    /// Announced hub version.
    pub version: String,
    /// Peer address.
    pub remote_addr: Option<String>,
    /// Handshake time.
    pub connected_at: DateTime<Utc>,
    /// Last inbound frame.
    pub last_heartbeat_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            hub_id: session.hub_id.clone(),
            session_id: session.id,
            state: session.state(),
            version: session.version.clone(),
            remote_addr: session.remote_addr.clone(),
            connected_at: session.connected_at,
            last_heartbeat_at: session.last_heartbeat_at(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn make_session(capacity: usize) -> (Session, mpsc::Receiver<String>) {
        let Ok(hub_id) = HubId::new("rpi-bridge-01") else {
            panic!("valid hub id");
        };
        let (tx, rx) = mpsc::channel(capacity);
        (
            Session::new(hub_id, "1.0.0".to_string(), None, tx),
            rx,
        )
    }

    #[test]
    fn starts_connecting() {
        let (session, _rx) = make_session(4);
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.close_reason().is_none());
    }

    #[test]
    fn transitions_only_move_forward() {
        let (session, _rx) = make_session(4);
        assert!(session.advance(SessionState::Authenticated));
        assert!(session.advance(SessionState::Active));
        assert!(!session.advance(SessionState::Authenticated));
        assert!(!session.advance(SessionState::Active));
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn first_close_reason_wins() {
        let (session, _rx) = make_session(4);
        session.advance(SessionState::Active);
        assert!(session.begin_close(CloseReason::Evicted));
        assert!(!session.begin_close(CloseReason::RemoteDisconnect));
        assert_eq!(session.close_reason(), Some(CloseReason::Evicted));
        assert!(session.state().is_closing());
    }

    #[test]
    fn send_requires_active_state() {
        let (session, mut rx) = make_session(4);
        assert_eq!(
            session.send_frame("early".to_string()),
            Err(CommandFailure::SendFailed)
        );
        session.advance(SessionState::Active);
        assert!(session.send_frame("hello".to_string()).is_ok());
        assert_eq!(rx.try_recv().ok().as_deref(), Some("hello"));

        session.begin_close(CloseReason::Shutdown);
        assert_eq!(
            session.send_frame("late".to_string()),
            Err(CommandFailure::SendFailed)
        );
    }

    #[test]
    fn full_queue_fails_immediately() {
        let (session, _rx) = make_session(1);
        session.advance(SessionState::Active);
        assert!(session.send_frame("one".to_string()).is_ok());
        assert_eq!(
            session.send_frame("two".to_string()),
            Err(CommandFailure::SendFailed)
        );
    }

    #[test]
    fn dropped_writer_fails_send() {
        let (session, rx) = make_session(4);
        session.advance(SessionState::Active);
        drop(rx);
        assert_eq!(
            session.send_frame("x".to_string()),
            Err(CommandFailure::SendFailed)
        );
    }

    #[tokio::test]
    async fn watchers_observe_eviction() {
        let (session, _rx) = make_session(4);
        session.advance(SessionState::Active);
        let mut watcher = session.watch_state();
        session.begin_close(CloseReason::Evicted);
        assert!(watcher.changed().await.is_ok());
        assert_eq!(*watcher.borrow(), SessionState::Closing);
    }

    #[tokio::test]
    async fn port_table_follows_device_events() {
        let (session, _rx) = make_session(1);
        assert!(session.ports().await.is_empty());

        let connected = PortEvent {
            kind: crate::domain::PortEventKind::Connected,
            port_id: "ttyUSB0".to_string(),
            device_info: None,
        };
        assert!(session.apply_port_event(&connected).await);
        assert_eq!(session.ports().await.len(), 1);

        let gone = PortEvent {
            kind: crate::domain::PortEventKind::Disconnected,
            ..connected
        };
        assert!(session.apply_port_event(&gone).await);
        assert!(!session.apply_port_event(&gone).await);
        assert!(session.ports().await.is_empty());
    }

    #[tokio::test]
    async fn health_snapshot_is_replaced() {
        let (session, _rx) = make_session(4);
        assert!(session.health().await.is_none());
        let snapshot = HealthSnapshot {
            received_at: Utc::now(),
            uptime_seconds: Some(42),
            system: serde_json::json!({"cpu": {"percent": 12.5}}),
            service: serde_json::Value::Null,
            errors: serde_json::Value::Null,
        };
        session.record_health(snapshot.clone()).await;
        assert_eq!(session.health().await, Some(snapshot));
    }

    #[test]
    fn summary_reflects_state() {
        let (session, _rx) = make_session(4);
        session.advance(SessionState::Active);
        session.touch();
        let summary = session.summary();
        assert_eq!(summary.state, SessionState::Active);
        assert_eq!(summary.session_id, session.id());
        assert_eq!(summary.version, "1.0.0");
    }
}
