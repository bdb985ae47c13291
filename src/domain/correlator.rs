//! Correlation of outbound commands with asynchronous device responses.
//!
//! Commands travel over a duplex socket, so each one is tagged with a
//! [`CommandId`] and parked here until a response frame, a session
//! teardown, or its deadline resolves it. Resolution removes the entry
//! under the map lock: the first resolution wins and every later attempt
//! for the same id is a no-op.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;

use super::HubId;
use super::command::{CommandFailure, CommandId, CommandKind, CommandResult, CommandStatus};
use super::session::SessionId;

/// Upper bound on how far ahead a deadline is placed.
const MAX_DEADLINE_AHEAD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Returns `now + timeout`, saturating at [`MAX_DEADLINE_AHEAD`].
fn far_deadline(now: Instant, timeout: Duration) -> Instant {
    now.checked_add(timeout.min(MAX_DEADLINE_AHEAD)).unwrap_or(now)
}

/// What a waiter eventually receives for a dispatched command.
pub type CommandOutcome = Result<CommandResult, CommandFailure>;

/// A command awaiting its response.
#[derive(Debug)]
struct PendingCommand {
    hub_id: HubId,
    session_id: SessionId,
    kind: CommandKind,
    issued_at: DateTime<Utc>,
    timeout: Duration,
    deadline: Instant,
    responder: oneshot::Sender<CommandOutcome>,
}

impl PendingCommand {
    /// Delivers `outcome` to the waiter (if it is still listening) and
    /// returns the record of what happened.
    fn complete(
        self,
        command_id: CommandId,
        outcome: Result<Option<serde_json::Value>, CommandFailure>,
    ) -> ResolvedCommand {
        let resolved_at = Utc::now();
        let (status, result, error, delivered) = match outcome {
            Ok(result) => (
                CommandStatus::Completed,
                result.clone(),
                None,
                Ok(CommandResult {
                    command_id,
                    hub_id: self.hub_id.clone(),
                    kind: self.kind,
                    result,
                    completed_at: resolved_at,
                }),
            ),
            Err(failure) => (
                failure.status(),
                None,
                Some(failure.to_string()),
                Err(failure),
            ),
        };

        // The operator may have gone away; the command still counts as resolved.
        let _ = self.responder.send(delivered);

        ResolvedCommand {
            command_id,
            hub_id: self.hub_id,
            session_id: self.session_id,
            kind: self.kind,
            status,
            result,
            error,
            issued_at: self.issued_at,
            resolved_at,
        }
    }
}

/// Record of a single resolution, returned to the caller that won it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCommand {
    /// Correlation identifier.
    pub command_id: CommandId,
    /// Hub the command was sent to.
    pub hub_id: HubId,
    /// Session the command was sent through.
    pub session_id: SessionId,
    /// Command kind.
    pub kind: CommandKind,
    /// Terminal status.
    pub status: CommandStatus,
    /// Device result payload on success.
    pub result: Option<serde_json::Value>,
    /// Failure description otherwise.
    pub error: Option<String>,
    /// Submission time.
    pub issued_at: DateTime<Utc>,
    /// Resolution time.
    pub resolved_at: DateTime<Utc>,
}

/// Handle returned by [`CommandCorrelator::submit`]; await it with
/// [`CommandCorrelator::wait`].
#[derive(Debug)]
pub struct PendingHandle {
    command_id: CommandId,
    timeout: Duration,
    deadline: Instant,
    receiver: oneshot::Receiver<CommandOutcome>,
}

impl PendingHandle {
    /// Returns the correlation identifier to embed in the command frame.
    #[must_use]
    pub const fn command_id(&self) -> CommandId {
        self.command_id
    }

    /// Returns the timeout the command was submitted with.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Tracks every outstanding command in the process.
#[derive(Debug, Default)]
pub struct CommandCorrelator {
    pending: Mutex<HashMap<CommandId, PendingCommand>>,
}

impl CommandCorrelator {
    /// Creates an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a new command with `deadline = now + timeout`.
    pub async fn submit(
        &self,
        hub_id: HubId,
        session_id: SessionId,
        kind: CommandKind,
        timeout: Duration,
    ) -> PendingHandle {
        self.submit_with(hub_id, session_id, kind, timeout, |_| {}).await
    }

    /// Like [`Self::submit`], but runs `on_issued` with the allocated id
    /// while the map lock is held and before the command becomes
    /// resolvable. No teardown, sweep or response can observe the id
    /// before `on_issued` returns.
    pub async fn submit_with(
        &self,
        hub_id: HubId,
        session_id: SessionId,
        kind: CommandKind,
        timeout: Duration,
        on_issued: impl FnOnce(CommandId),
    ) -> PendingHandle {
        let (responder, receiver) = oneshot::channel();
        let deadline = far_deadline(Instant::now(), timeout);

        let mut map = self.pending.lock().await;
        let mut command_id = CommandId::new();
        while map.contains_key(&command_id) {
            command_id = CommandId::new();
        }
        on_issued(command_id);
        map.insert(
            command_id,
            PendingCommand {
                hub_id,
                session_id,
                kind,
                issued_at: Utc::now(),
                timeout,
                deadline,
                responder,
            },
        );

        PendingHandle {
            command_id,
            timeout,
            deadline,
            receiver,
        }
    }

    /// Resolves a command successfully.
    ///
    /// Returns `None` if the id is unknown or already resolved.
    pub async fn resolve_success(
        &self,
        command_id: CommandId,
        result: Option<serde_json::Value>,
    ) -> Option<ResolvedCommand> {
        self.resolve(command_id, None, Ok(result)).await
    }

    /// Resolves a command as failed.
    ///
    /// Returns `None` if the id is unknown or already resolved.
    pub async fn resolve_failure(
        &self,
        command_id: CommandId,
        failure: CommandFailure,
    ) -> Option<ResolvedCommand> {
        self.resolve(command_id, None, Err(failure)).await
    }

    /// Resolves a command from a response frame received on `hub_id`'s
    /// connection. A response for a command sent to another hub is
    /// treated like an unknown id.
    pub async fn resolve_response(
        &self,
        hub_id: &HubId,
        command_id: CommandId,
        outcome: Result<Option<serde_json::Value>, CommandFailure>,
    ) -> Option<ResolvedCommand> {
        self.resolve(command_id, Some(hub_id), outcome).await
    }

    async fn resolve(
        &self,
        command_id: CommandId,
        expected_hub: Option<&HubId>,
        outcome: Result<Option<serde_json::Value>, CommandFailure>,
    ) -> Option<ResolvedCommand> {
        let pending = {
            let mut map = self.pending.lock().await;
            let owned = map
                .get(&command_id)
                .is_some_and(|p| expected_hub.is_none_or(|hub| *hub == p.hub_id));
            if !owned {
                return None;
            }
            map.remove(&command_id)?
        };
        Some(pending.complete(command_id, outcome))
    }

    /// Fails every command sent through `session_id` with `failure`.
    pub async fn fail_session(
        &self,
        session_id: SessionId,
        failure: CommandFailure,
    ) -> Vec<ResolvedCommand> {
        self.pending
            .lock()
            .await
            .extract_if(|_, p| p.session_id == session_id)
            .map(|(id, pending)| pending.complete(id, Err(failure.clone())))
            .collect()
    }

    /// Resolves every command whose deadline is at or before `now` with
    /// [`CommandFailure::Timeout`].
    pub async fn sweep_expired(&self, now: Instant) -> Vec<ResolvedCommand> {
        self.pending
            .lock()
            .await
            .extract_if(|_, p| p.deadline <= now)
            .map(|(id, pending)| {
                let failure = CommandFailure::Timeout(pending.timeout);
                pending.complete(id, Err(failure))
            })
            .collect()
    }

    /// Waits for `handle` to resolve, bounded by its deadline.
    ///
    /// If the deadline passes before the sweeper gets to it, this call
    /// resolves the command as timed out itself. The returned
    /// [`ResolvedCommand`] is `Some` only when this call won that
    /// resolution.
    pub async fn wait(&self, handle: PendingHandle) -> (CommandOutcome, Option<ResolvedCommand>) {
        let PendingHandle {
            command_id,
            timeout,
            deadline,
            mut receiver,
        } = handle;

        match tokio::time::timeout_at(deadline, &mut receiver).await {
            Ok(received) => (received.unwrap_or(Err(CommandFailure::DeviceDisconnected)), None),
            Err(_) => {
                let resolved = self
                    .resolve_failure(command_id, CommandFailure::Timeout(timeout))
                    .await;
                let outcome = receiver
                    .await
                    .unwrap_or(Err(CommandFailure::Timeout(timeout)));
                (outcome, resolved)
            }
        }
    }

    /// Returns `true` if `command_id` is still awaiting resolution.
    pub async fn is_pending(&self, command_id: CommandId) -> bool {
        self.pending.lock().await.contains_key(&command_id)
    }

    /// Returns the number of outstanding commands.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}
