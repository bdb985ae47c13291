//! Hub service: session lifecycle, inbound frame routing and command
//! dispatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::auth::DeviceAuthenticator;
use crate::domain::command::{CommandStatus, CommandTimeouts};
use crate::domain::correlator::ResolvedCommand;
use crate::domain::session::{HealthSnapshot, SessionSummary};
use crate::domain::{
    CloseReason, CommandCorrelator, CommandFailure, CommandId, CommandRequest, CommandResult,
    EventBus, HubEvent, HubId, HubRegistry, PortInfo, Session, SessionState, TelemetrySink,
};
use crate::error::GatewayError;
use crate::persistence::models::{
    CommandLogEntry, TelemetryQuery, TelemetryRecord, TelemetryStats,
};
use crate::persistence::{CommandLogStore, CommandUpdate, TelemetryStore};
use crate::protocol::frames::{CommandResponse, ResponseStatus};
use crate::protocol::{Handshake, InboundFrame, ServerFrame};

/// Point-in-time view of one connected hub.
#[derive(Debug, Clone)]
pub struct HubDetail {
    /// Session summary.
    pub summary: SessionSummary,
    /// Latest health snapshot, if the hub sent one.
    pub health: Option<HealthSnapshot>,
    /// Stored telemetry totals.
    pub telemetry: TelemetryStats,
}

/// Orchestration layer between device connections and operators.
///
/// Stateless coordinator: owns references to the [`HubRegistry`], the
/// [`CommandCorrelator`], the [`TelemetrySink`] and the command log, and
/// emits a [`HubEvent`] for every observable change.
#[derive(Debug, Clone)]
pub struct HubService {
    registry: Arc<HubRegistry>,
    correlator: Arc<CommandCorrelator>,
    telemetry: Arc<TelemetrySink>,
    command_log: Arc<dyn CommandLogStore>,
    devices: Arc<dyn DeviceAuthenticator>,
    event_bus: EventBus,
    timeouts: CommandTimeouts,
    shutdown: Arc<watch::Sender<bool>>,
}

impl HubService {
    /// Creates a new `HubService`.
    #[must_use]
    pub fn new(
        devices: Arc<dyn DeviceAuthenticator>,
        telemetry_store: Arc<dyn TelemetryStore>,
        command_log: Arc<dyn CommandLogStore>,
        event_bus: EventBus,
        timeouts: CommandTimeouts,
    ) -> Self {
        Self {
            registry: Arc::new(HubRegistry::new()),
            correlator: Arc::new(CommandCorrelator::new()),
            telemetry: Arc::new(TelemetrySink::new(telemetry_store, event_bus.clone())),
            command_log,
            devices,
            event_bus,
            timeouts,
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns a reference to the inner [`HubRegistry`].
    #[must_use]
    pub const fn registry(&self) -> &Arc<HubRegistry> {
        &self.registry
    }

    /// Returns the number of commands awaiting a response.
    pub async fn pending_commands(&self) -> usize {
        self.correlator.pending_count().await
    }

    // ── Session lifecycle ────────────────────────────────────────────────

    /// Authenticates a handshake and installs the resulting session.
    ///
    /// A previous session for the same hub is evicted and fully torn down
    /// before this returns: its pending commands fail with
    /// [`CommandFailure::DeviceDisconnected`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidHandshake`] if the token is unknown
    /// or bound to a different hub than the one claimed.
    pub async fn open_session(
        &self,
        handshake: Handshake,
        remote_addr: Option<String>,
        outbound: mpsc::Sender<String>,
    ) -> Result<Arc<Session>, GatewayError> {
        let hub_id = self
            .devices
            .authenticate(&handshake.device_token)
            .map_err(|e| GatewayError::InvalidHandshake(e.to_string()))?;
        if hub_id != handshake.hub_id {
            return Err(GatewayError::InvalidHandshake(format!(
                "token is not provisioned for hub {}",
                handshake.hub_id
            )));
        }

        let session = Session::new(hub_id, handshake.version, remote_addr, outbound);
        session.advance(SessionState::Authenticated);

        let registration = self.registry.register(Arc::new(session)).await;
        if let Some(evicted) = &registration.evicted {
            tracing::info!(
                hub_id = %evicted.hub_id(),
                session_id = %evicted.id(),
                "hub session evicted by newer connection"
            );
            self.finish_close(evicted).await;
        }

        let session = registration.session;
        let _ = self.event_bus.publish(HubEvent::HubConnected {
            hub_id: session.hub_id().clone(),
            session_id: session.id(),
            version: session.version().to_string(),
            timestamp: session.connected_at(),
        });
        tracing::info!(
            hub_id = %session.hub_id(),
            session_id = %session.id(),
            version = session.version(),
            "hub connected"
        );
        Ok(session)
    }

    /// Tears `session` down: records `reason` (unless another one was
    /// recorded first), removes it from the registry if it is still the
    /// current session, and fails its pending commands.
    ///
    /// Safe to call more than once and after eviction.
    pub async fn close_session(&self, session: &Arc<Session>, reason: CloseReason) {
        session.begin_close(reason);
        self.registry.unregister(session).await;
        self.finish_close(session).await;
    }

    async fn finish_close(&self, session: &Session) {
        let failed = self
            .correlator
            .fail_session(session.id(), CommandFailure::DeviceDisconnected)
            .await;
        for resolved in &failed {
            self.record_resolution(resolved);
        }

        if session.advance(SessionState::Closed) {
            let reason = session.close_reason().unwrap_or(CloseReason::RemoteDisconnect);
            let _ = self.event_bus.publish(HubEvent::HubDisconnected {
                hub_id: session.hub_id().clone(),
                session_id: session.id(),
                reason,
                timestamp: Utc::now(),
            });
            tracing::info!(
                hub_id = %session.hub_id(),
                session_id = %session.id(),
                %reason,
                failed_commands = failed.len(),
                "hub disconnected"
            );
        }
    }

    /// Signals every live session to close. Returns how many were
    /// signalled; each connection loop completes its own teardown.
    pub async fn shutdown(&self) -> usize {
        self.shutdown.send_replace(true);
        self.registry.close_all(CloseReason::Shutdown).await
    }

    /// Returns a receiver that flips to `true` once [`Self::shutdown`] runs.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    // ── Inbound frames ───────────────────────────────────────────────────

    /// Routes one classified inbound frame. Every frame, malformed or not,
    /// refreshes the session's liveness.
    pub async fn handle_frame(&self, session: &Session, frame: InboundFrame) {
        session.touch();
        match frame {
            InboundFrame::CommandResponse(response) => {
                self.handle_response(session, response).await;
            }
            InboundFrame::Telemetry(sample) => {
                let record = self.telemetry.record(session.hub_id(), sample);
                tracing::debug!(
                    hub_id = %record.hub_id,
                    sequence = record.sequence,
                    port_id = %record.port_id,
                    bytes = record.data_size_bytes,
                    "telemetry stored"
                );
            }
            InboundFrame::Heartbeat(Some(snapshot)) => {
                session.record_health(snapshot.clone()).await;
                let _ = self.event_bus.publish(HubEvent::Health {
                    hub_id: session.hub_id().clone(),
                    snapshot,
                });
            }
            InboundFrame::DeviceEvent(event) => {
                if session.apply_port_event(&event).await {
                    tracing::info!(
                        hub_id = %session.hub_id(),
                        port_id = %event.port_id,
                        event = ?event.kind,
                        "port changed"
                    );
                } else {
                    tracing::debug!(
                        hub_id = %session.hub_id(),
                        port_id = %event.port_id,
                        "disconnect for unknown port"
                    );
                }
                let _ = self.event_bus.publish(HubEvent::DeviceEvent {
                    hub_id: session.hub_id().clone(),
                    port_id: event.port_id,
                    event: event.kind,
                    timestamp: Utc::now(),
                });
            }
            InboundFrame::Heartbeat(None) => {
                tracing::trace!(hub_id = %session.hub_id(), "heartbeat");
            }
            InboundFrame::Malformed(error) => {
                tracing::warn!(hub_id = %session.hub_id(), %error, "dropping malformed frame");
            }
        }
    }

    async fn handle_response(&self, session: &Session, response: CommandResponse) {
        let hub_id = session.hub_id();
        let Ok(command_id) = response.command_id.parse::<CommandId>() else {
            tracing::debug!(
                %hub_id,
                command_id = %response.command_id,
                "discarding response with unparseable command id"
            );
            return;
        };

        let outcome = match response.status {
            ResponseStatus::Running => {
                let owned = self
                    .command_log
                    .command(&command_id)
                    .is_some_and(|entry| entry.hub_id == *hub_id);
                if owned {
                    self.command_log.log_update(
                        &command_id,
                        CommandUpdate {
                            status: CommandStatus::Running,
                            progress: response.progress,
                            result: None,
                            error: None,
                            at: Utc::now(),
                        },
                    );
                }
                return;
            }
            ResponseStatus::Completed => Ok(response.result),
            ResponseStatus::Failed => Err(CommandFailure::DeviceError(
                response
                    .error
                    .unwrap_or_else(|| "device reported failure".to_string()),
            )),
        };

        match self
            .correlator
            .resolve_response(hub_id, command_id, outcome)
            .await
        {
            Some(resolved) => self.record_resolution(&resolved),
            None => tracing::debug!(
                %hub_id,
                %command_id,
                "discarding response for unknown or resolved command"
            ),
        }
    }

    fn record_resolution(&self, resolved: &ResolvedCommand) {
        self.command_log.log_update(
            &resolved.command_id,
            CommandUpdate {
                status: resolved.status,
                progress: None,
                result: resolved.result.clone(),
                error: resolved.error.clone(),
                at: resolved.resolved_at,
            },
        );
        let _ = self.event_bus.publish(HubEvent::CommandResolved {
            hub_id: resolved.hub_id.clone(),
            command_id: resolved.command_id,
            kind: resolved.kind,
            status: resolved.status,
            error: resolved.error.clone(),
            timestamp: resolved.resolved_at,
        });

        if resolved.status == CommandStatus::Completed {
            tracing::info!(
                hub_id = %resolved.hub_id,
                command_id = %resolved.command_id,
                kind = %resolved.kind,
                "command completed"
            );
        } else {
            tracing::warn!(
                hub_id = %resolved.hub_id,
                command_id = %resolved.command_id,
                kind = %resolved.kind,
                status = ?resolved.status,
                error = resolved.error.as_deref().unwrap_or_default(),
                "command failed"
            );
        }
    }

    // ── Command dispatch ─────────────────────────────────────────────────

    /// Sends `request` to `hub_id` and waits for the device's answer.
    ///
    /// `timeout` overrides the kind default and is clamped to the
    /// configured maximum. Never waits past the effective timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HubNotConnected`] immediately if the hub
    /// has no active session, or [`GatewayError::CommandFailed`] carrying
    /// the [`CommandFailure`] otherwise.
    pub async fn dispatch(
        &self,
        hub_id: &HubId,
        request: CommandRequest,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, GatewayError> {
        let session = self.registry.lookup(hub_id).await?;
        let kind = request.kind();
        let timeout = self.timeouts.effective(kind, timeout);

        // The log entry exists before any teardown or sweep can resolve the command.
        let handle = self
            .correlator
            .submit_with(hub_id.clone(), session.id(), kind, timeout, |command_id| {
                self.command_log.log_issued(CommandLogEntry::pending(
                    command_id,
                    hub_id.clone(),
                    kind,
                    request.port_id(),
                ));
            })
            .await;
        let command_id = handle.command_id();

        let sent = ServerFrame::command(command_id, &request)
            .encode()
            .map_err(|error| {
                tracing::error!(%command_id, %error, "failed to encode command frame");
                CommandFailure::SendFailed
            })
            .and_then(|text| session.send_frame(text));

        match sent {
            Ok(()) => tracing::info!(
                %hub_id,
                %command_id,
                %kind,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "command dispatched"
            ),
            Err(failure) => {
                if let Some(resolved) = self.correlator.resolve_failure(command_id, failure).await {
                    self.record_resolution(&resolved);
                }
            }
        }

        let (outcome, backstop) = self.correlator.wait(handle).await;
        if let Some(resolved) = backstop {
            self.record_resolution(&resolved);
        }
        outcome.map_err(|failure| GatewayError::CommandFailed {
            command_id,
            failure,
        })
    }

    /// Resolves every pending command whose deadline has passed. Returns
    /// how many were timed out.
    pub async fn sweep_expired(&self) -> usize {
        let expired = self.correlator.sweep_expired(Instant::now()).await;
        for resolved in &expired {
            self.record_resolution(resolved);
        }
        expired.len()
    }

    /// Spawns a task that runs [`Self::sweep_expired`] every `interval`.
    #[must_use]
    pub fn spawn_timeout_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired = service.sweep_expired().await;
                if expired > 0 {
                    tracing::debug!(expired, "timed out pending commands");
                }
            }
        })
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Lists connected hubs, sorted by hub id.
    pub async fn list_hubs(&self) -> Vec<SessionSummary> {
        self.registry.list().await
    }

    /// Returns the detail view of one connected hub.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HubNotConnected`] if the hub is not active.
    pub async fn hub_detail(&self, hub_id: &HubId) -> Result<HubDetail, GatewayError> {
        let session = self.registry.lookup(hub_id).await?;
        Ok(HubDetail {
            summary: session.summary(),
            health: session.health().await,
            telemetry: self.telemetry.stats(hub_id),
        })
    }

    /// Returns the serial ports a connected hub reports as attached.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HubNotConnected`] if the hub is not active.
    pub async fn ports(&self, hub_id: &HubId) -> Result<Vec<PortInfo>, GatewayError> {
        let session = self.registry.lookup(hub_id).await?;
        Ok(session.ports().await)
    }

    /// Returns stored telemetry of a connected hub, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::HubNotConnected`] if the hub is not active.
    pub async fn telemetry(
        &self,
        hub_id: &HubId,
        query: &TelemetryQuery,
    ) -> Result<Vec<TelemetryRecord>, GatewayError> {
        self.registry.lookup(hub_id).await?;
        Ok(self.telemetry.query(hub_id, query))
    }

    /// Returns the command-log entry for `command_id` on `hub_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::CommandNotFound`] if no such entry exists
    /// for that hub.
    pub fn command_status(
        &self,
        hub_id: &HubId,
        command_id: CommandId,
    ) -> Result<CommandLogEntry, GatewayError> {
        self.command_log
            .command(&command_id)
            .filter(|entry| entry.hub_id == *hub_id)
            .ok_or_else(|| GatewayError::CommandNotFound(command_id.to_string()))
    }

    /// Returns up to `limit` command-log entries of `hub_id`, newest first.
    #[must_use]
    pub fn commands(&self, hub_id: &HubId, limit: usize) -> Vec<CommandLogEntry> {
        self.command_log.commands(hub_id, limit)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::StaticDeviceTokens;
    use crate::domain::command::CommandKind;
    use crate::persistence::MemoryStore;
    use crate::protocol::classify;

    fn hub(name: &str) -> HubId {
        let Ok(id) = HubId::new(name) else {
            panic!("valid hub id");
        };
        id
    }

    fn make_service() -> HubService {
        let devices = StaticDeviceTokens::new([
            ("tok-h1".to_string(), hub("H1")),
            ("tok-h2".to_string(), hub("H2")),
        ]);
        let store = Arc::new(MemoryStore::default());
        HubService::new(
            Arc::new(devices),
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            store,
            EventBus::new(64),
            CommandTimeouts::default(),
        )
    }

    fn handshake(hub_id: &str, token: &str) -> Handshake {
        Handshake {
            hub_id: hub(hub_id),
            device_token: token.to_string(),
            version: "1.0.0".to_string(),
        }
    }

    async fn connect(
        service: &HubService,
        hub_id: &str,
        token: &str,
        capacity: usize,
    ) -> (Arc<Session>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let Ok(session) = service
            .open_session(handshake(hub_id, token), None, tx)
            .await
        else {
            panic!("handshake should be accepted");
        };
        (session, rx)
    }

    fn command_id_of(frame: &str) -> String {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(frame) else {
            panic!("command frame should be JSON");
        };
        let Some(id) = value.pointer("/command/commandId").and_then(|v| v.as_str()) else {
            panic!("command frame should carry a commandId");
        };
        id.to_string()
    }

    async fn wait_for_pending(service: &HubService, count: usize) {
        for _ in 0..200 {
            if service.pending_commands().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} pending commands");
    }

    fn write(data: &str) -> CommandRequest {
        CommandRequest::Write {
            port_id: "ttyUSB0".to_string(),
            data: data.to_string(),
            encoding: "utf-8".to_string(),
            priority: 5,
        }
    }

    fn restart() -> CommandRequest {
        CommandRequest::Restart {
            port_id: "ttyACM0".to_string(),
            priority: 2,
        }
    }

    #[tokio::test]
    async fn dispatch_to_unknown_hub_fails_fast() {
        let service = make_service();
        let started = std::time::Instant::now();
        let result = service.dispatch(&hub("H1"), write("AA"), None).await;
        assert!(matches!(result, Err(GatewayError::HubNotConnected(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(service.pending_commands().await, 0);
    }

    #[tokio::test]
    async fn rejects_unknown_token_and_hub_mismatch() {
        let service = make_service();
        let (tx, _rx) = mpsc::channel(4);
        let unknown = service
            .open_session(handshake("H1", "bogus"), None, tx.clone())
            .await;
        assert!(matches!(unknown, Err(GatewayError::InvalidHandshake(_))));

        let mismatch = service.open_session(handshake("H1", "tok-h2"), None, tx).await;
        assert!(matches!(mismatch, Err(GatewayError::InvalidHandshake(_))));
        assert!(service.list_hubs().await.is_empty());
    }

    #[tokio::test]
    async fn write_round_trip_completes() {
        let service = make_service();
        let (session, mut rx) = connect(&service, "H1", "tok-h1", 8).await;

        let device = {
            let service = service.clone();
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                let Some(frame) = rx.recv().await else {
                    panic!("command frame expected");
                };
                let id = command_id_of(&frame);
                let reply = format!(
                    r#"{{"type":"command_response","commandId":"{id}","status":"completed","result":{{"bytesWritten":2}}}}"#
                );
                service.handle_frame(&session, classify(&reply)).await;
            })
        };

        let result = service
            .dispatch(&hub("H1"), write("AA"), Some(Duration::from_secs(2)))
            .await;
        assert!(device.await.is_ok());

        let Ok(result) = result else {
            panic!("write should succeed");
        };
        assert_eq!(result.kind, CommandKind::Write);
        assert_eq!(result.result, Some(serde_json::json!({"bytesWritten": 2})));
        assert_eq!(service.sweep_expired().await, 0);

        let Ok(entry) = service.command_status(&hub("H1"), result.command_id) else {
            panic!("command should be logged");
        };
        assert_eq!(entry.status, CommandStatus::Completed);
    }

    #[tokio::test]
    async fn unanswered_restart_times_out() {
        let service = make_service();
        let (_session, _rx) = connect(&service, "H1", "tok-h1", 8).await;

        let started = std::time::Instant::now();
        let result = service
            .dispatch(&hub("H1"), restart(), Some(Duration::from_secs(1)))
            .await;
        let Err(GatewayError::CommandFailed { command_id, failure }) = result else {
            panic!("restart should time out");
        };
        assert_eq!(failure, CommandFailure::Timeout(Duration::from_secs(1)));
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(service.pending_commands().await, 0);

        let Ok(entry) = service.command_status(&hub("H1"), command_id) else {
            panic!("command should be logged");
        };
        assert_eq!(entry.status, CommandStatus::Timeout);
    }

    #[tokio::test]
    async fn disconnect_fails_every_pending_command() {
        let service = make_service();
        let (session, _rx) = connect(&service, "H1", "tok-h1", 8).await;

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.dispatch(&hub("H1"), write("AA"), None).await }
        });
        let second = tokio::spawn({
            let service = service.clone();
            async move { service.dispatch(&hub("H1"), restart(), None).await }
        });
        wait_for_pending(&service, 2).await;

        service.close_session(&session, CloseReason::RemoteDisconnect).await;

        for task in [first, second] {
            let Ok(result) = task.await else {
                panic!("dispatch task panicked");
            };
            assert!(matches!(
                result,
                Err(GatewayError::CommandFailed {
                    failure: CommandFailure::DeviceDisconnected,
                    ..
                })
            ));
        }
        assert_eq!(session.state(), SessionState::Closed);
        assert!(service.list_hubs().await.is_empty());
    }

    #[tokio::test]
    async fn second_connection_evicts_first() {
        let service = make_service();
        let mut events = service.event_bus().subscribe();
        let (first, _rx1) = connect(&service, "H1", "tok-h1", 8).await;

        let pending = tokio::spawn({
            let service = service.clone();
            async move { service.dispatch(&hub("H1"), write("AA"), None).await }
        });
        wait_for_pending(&service, 1).await;

        let (second, _rx2) = connect(&service, "H1", "tok-h1", 8).await;

        assert_eq!(first.state(), SessionState::Closed);
        assert_eq!(first.close_reason(), Some(CloseReason::Evicted));
        assert_eq!(second.state(), SessionState::Active);
        let Ok(result) = pending.await else {
            panic!("dispatch task panicked");
        };
        assert!(matches!(
            result,
            Err(GatewayError::CommandFailed {
                failure: CommandFailure::DeviceDisconnected,
                ..
            })
        ));

        // The stale connection loop finishing later must not remove the new session.
        service.close_session(&first, CloseReason::RemoteDisconnect).await;
        let Ok(detail) = service.hub_detail(&hub("H1")).await else {
            panic!("second session should stay registered");
        };
        assert_eq!(detail.summary.session_id, second.id());

        let mut disconnects = 0;
        while let Ok(event) = events.try_recv() {
            if let HubEvent::HubDisconnected { reason, .. } = event {
                assert_eq!(reason, CloseReason::Evicted);
                disconnects += 1;
            }
        }
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn unknown_response_leaves_others_pending() {
        let service = make_service();
        let (session, mut rx) = connect(&service, "H1", "tok-h1", 8).await;

        let pending = tokio::spawn({
            let service = service.clone();
            async move {
                service
                    .dispatch(&hub("H1"), write("AA"), Some(Duration::from_secs(2)))
                    .await
            }
        });
        let Some(frame) = rx.recv().await else {
            panic!("command frame expected");
        };
        let id = command_id_of(&frame);

        let stray = format!(
            r#"{{"type":"command_response","commandId":"{}","status":"completed"}}"#,
            CommandId::new()
        );
        service.handle_frame(&session, classify(&stray)).await;
        service
            .handle_frame(
                &session,
                classify(r#"{"type":"command_response","commandId":"garbage","status":"failed"}"#),
            )
            .await;
        assert_eq!(service.pending_commands().await, 1);

        let reply = format!(
            r#"{{"type":"command_response","commandId":"{id}","status":"failed","error":"port busy"}}"#
        );
        service.handle_frame(&session, classify(&reply)).await;

        let Ok(result) = pending.await else {
            panic!("dispatch task panicked");
        };
        let Err(GatewayError::CommandFailed { failure, .. }) = result else {
            panic!("device failure expected");
        };
        assert_eq!(failure, CommandFailure::DeviceError("port busy".to_string()));
    }

    #[tokio::test]
    async fn running_status_updates_progress_only() {
        let service = make_service();
        let (session, mut rx) = connect(&service, "H1", "tok-h1", 8).await;

        let flash = CommandRequest::Flash {
            port_id: "ttyACM0".to_string(),
            firmware_data: "AAEC".to_string(),
            board_fqbn: Some("arduino:avr:uno".to_string()),
            priority: 3,
        };
        let pending = tokio::spawn({
            let service = service.clone();
            async move { service.dispatch(&hub("H1"), flash, None).await }
        });
        let Some(frame) = rx.recv().await else {
            panic!("command frame expected");
        };
        let id = command_id_of(&frame);
        let Ok(command_id) = id.parse::<CommandId>() else {
            panic!("command id should parse");
        };

        let progress = format!(
            r#"{{"type":"task_status","taskId":"{id}","status":"running","progress":50}}"#
        );
        service.handle_frame(&session, classify(&progress)).await;
        assert_eq!(service.pending_commands().await, 1);
        let Ok(entry) = service.command_status(&hub("H1"), command_id) else {
            panic!("command should be logged");
        };
        assert_eq!(entry.status, CommandStatus::Running);
        assert_eq!(entry.progress, Some(50.0));

        let done = format!(r#"{{"type":"task_status","taskId":"{id}","status":"completed"}}"#);
        service.handle_frame(&session, classify(&done)).await;
        let Ok(Ok(result)) = pending.await else {
            panic!("flash should succeed");
        };
        assert_eq!(result.kind, CommandKind::Flash);
        assert!(service.command_status(&hub("H2"), command_id).is_err());
    }

    #[tokio::test]
    async fn full_outbound_queue_fails_with_send_failed() {
        let service = make_service();
        let (session, _rx) = connect(&service, "H1", "tok-h1", 1).await;
        assert!(session.send_frame("filler".to_string()).is_ok());

        let result = service.dispatch(&hub("H1"), write("AA"), None).await;
        let Err(GatewayError::CommandFailed { failure, command_id }) = result else {
            panic!("send should fail");
        };
        assert_eq!(failure, CommandFailure::SendFailed);
        assert_eq!(service.pending_commands().await, 0);
        let Ok(entry) = service.command_status(&hub("H1"), command_id) else {
            panic!("command should be logged");
        };
        assert_eq!(entry.status, CommandStatus::SendFailed);
    }

    #[tokio::test]
    async fn telemetry_and_health_are_recorded() {
        let service = make_service();
        let (session, _rx) = connect(&service, "H1", "tok-h1", 8).await;

        for payload in ["aGVsbG8=", "d29ybGQ="] {
            let frame = format!(r#"{{"type":"telemetry","portId":"ttyUSB0","data":"{payload}"}}"#);
            service.handle_frame(&session, classify(&frame)).await;
        }
        service
            .handle_frame(&session, classify(r#"{"type":"telemetry","portId":"p","data":"!!"}"#))
            .await;
        service
            .handle_frame(&session, classify(r#"{"type":"health","uptime_seconds":12}"#))
            .await;

        let query = TelemetryQuery {
            limit: 10,
            since: None,
        };
        let Ok(records) = service.telemetry(&hub("H1"), &query).await else {
            panic!("hub is connected");
        };
        assert_eq!(records.len(), 2);
        assert!(records.windows(2).all(|w| matches!(w, [a, b] if a.sequence < b.sequence)));

        let Ok(detail) = service.hub_detail(&hub("H1")).await else {
            panic!("hub is connected");
        };
        assert_eq!(detail.telemetry.total_bytes, 10);
        assert_eq!(detail.health.and_then(|h| h.uptime_seconds), Some(12));

        assert!(matches!(
            service.telemetry(&hub("H2"), &query).await,
            Err(GatewayError::HubNotConnected(_))
        ));
    }

    /// Command log whose `log_issued` blocks for a while, announcing the call first.
    #[derive(Debug)]
    struct SlowCommandLog {
        inner: MemoryStore,
        issuing: Arc<tokio::sync::Notify>,
    }

    impl CommandLogStore for SlowCommandLog {
        fn log_issued(&self, entry: CommandLogEntry) {
            self.issuing.notify_one();
            std::thread::sleep(Duration::from_millis(150));
            self.inner.log_issued(entry);
        }

        fn log_update(&self, command_id: &CommandId, update: CommandUpdate) -> bool {
            self.inner.log_update(command_id, update)
        }

        fn command(&self, command_id: &CommandId) -> Option<CommandLogEntry> {
            self.inner.command(command_id)
        }

        fn commands(&self, hub_id: &HubId, limit: usize) -> Vec<CommandLogEntry> {
            self.inner.commands(hub_id, limit)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn teardown_during_dispatch_leaves_terminal_log_entry() {
        let issuing = Arc::new(tokio::sync::Notify::new());
        let log = Arc::new(SlowCommandLog {
            inner: MemoryStore::default(),
            issuing: Arc::clone(&issuing),
        });
        let service = HubService::new(
            Arc::new(StaticDeviceTokens::new([("tok-h1".to_string(), hub("H1"))])),
            Arc::new(MemoryStore::default()),
            log,
            EventBus::new(16),
            CommandTimeouts::default(),
        );
        let (session, _rx) = connect(&service, "H1", "tok-h1", 8).await;

        let pending = tokio::spawn({
            let service = service.clone();
            async move { service.dispatch(&hub("H1"), write("AA"), None).await }
        });
        issuing.notified().await;
        service.close_session(&session, CloseReason::RemoteDisconnect).await;

        let Ok(result) = pending.await else {
            panic!("dispatch task panicked");
        };
        let Err(GatewayError::CommandFailed { command_id, failure }) = result else {
            panic!("dispatch should fail on teardown");
        };
        assert_eq!(failure, CommandFailure::DeviceDisconnected);
        let Ok(entry) = service.command_status(&hub("H1"), command_id) else {
            panic!("command should be logged");
        };
        assert_eq!(entry.status, CommandStatus::Disconnected);
    }

    #[tokio::test]
    async fn device_events_maintain_port_list() {
        let service = make_service();
        let mut events = service.event_bus().subscribe();
        let (session, _rx) = connect(&service, "H1", "tok-h1", 8).await;

        service
            .handle_frame(
                &session,
                classify(
                    r#"{"type":"device_event","eventType":"connected","portId":"ttyUSB0","deviceInfo":{"manufacturer":"FTDI"}}"#,
                ),
            )
            .await;
        let Ok(ports) = service.ports(&hub("H1")).await else {
            panic!("hub is connected");
        };
        assert_eq!(ports.len(), 1);
        assert_eq!(ports.first().and_then(|p| p.manufacturer.as_deref()), Some("FTDI"));

        service
            .handle_frame(
                &session,
                classify(r#"{"type":"device_event","eventType":"disconnected","portId":"ttyUSB0"}"#),
            )
            .await;
        let Ok(ports) = service.ports(&hub("H1")).await else {
            panic!("hub is connected");
        };
        assert!(ports.is_empty());

        let mut port_events = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let HubEvent::DeviceEvent { port_id, event, .. } = event {
                port_events.push((port_id, event));
            }
        }
        assert_eq!(
            port_events,
            vec![
                ("ttyUSB0".to_string(), crate::domain::PortEventKind::Connected),
                ("ttyUSB0".to_string(), crate::domain::PortEventKind::Disconnected),
            ]
        );
        assert!(matches!(
            service.ports(&hub("H2")).await,
            Err(GatewayError::HubNotConnected(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_signals_sessions() {
        let service = make_service();
        let (a, _rx1) = connect(&service, "H1", "tok-h1", 8).await;
        let (b, _rx2) = connect(&service, "H2", "tok-h2", 8).await;
        let signal = service.shutdown_signal();
        assert!(!*signal.borrow());

        assert_eq!(service.shutdown().await, 2);
        assert!(*signal.borrow());
        assert_eq!(a.close_reason(), Some(CloseReason::Shutdown));
        assert!(b.state().is_closing());
    }
}
