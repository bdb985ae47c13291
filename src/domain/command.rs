//! Operator commands, their identifiers and their outcomes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::HubId;

/// Correlation identifier linking an outbound command to its response.
///
/// Wraps a UUID v4, so identifiers are unique for the lifetime of the
/// process without any shared counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(uuid::Uuid);

impl CommandId {
    /// Creates a new random `CommandId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `CommandId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CommandId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// The three command kinds an operator can issue to a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Write an arbitrary payload to a serial port on the hub.
    Write,
    /// Flash firmware onto the board attached to a port.
    Flash,
    /// Restart the board attached to a port.
    Restart,
}

impl CommandKind {
    /// Returns the `commandType` string used on the device wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Write => "serial_write",
            Self::Flash => "flash",
            Self::Restart => "restart",
        }
    }

    /// Returns the kind as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Flash => "flash",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated command ready to be framed and sent to a hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    /// Serial write.
    Write {
        /// Target port on the hub.
        port_id: String,
        /// Payload to write.
        data: String,
        /// Encoding of `data` as understood by the hub (e.g. `"utf-8"`).
        encoding: String,
        /// Hub-side queue priority (1 = highest, 10 = lowest).
        priority: u8,
    },
    /// Firmware flash.
    Flash {
        /// Target port on the hub.
        port_id: String,
        /// Base64-encoded firmware image.
        firmware_data: String,
        /// Optional fully qualified board name.
        board_fqbn: Option<String>,
        /// Hub-side queue priority.
        priority: u8,
    },
    /// Board restart.
    Restart {
        /// Target port on the hub.
        port_id: String,
        /// Hub-side queue priority.
        priority: u8,
    },
}

impl CommandRequest {
    /// Returns the kind of this command.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Write { .. } => CommandKind::Write,
            Self::Flash { .. } => CommandKind::Flash,
            Self::Restart { .. } => CommandKind::Restart,
        }
    }

    /// Returns the target port.
    #[must_use]
    pub fn port_id(&self) -> &str {
        match self {
            Self::Write { port_id, .. }
            | Self::Flash { port_id, .. }
            | Self::Restart { port_id, .. } => port_id,
        }
    }

    /// Returns the hub-side priority.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::Write { priority, .. }
            | Self::Flash { priority, .. }
            | Self::Restart { priority, .. } => *priority,
        }
    }

    /// Returns the kind-specific `params` object for the wire frame.
    #[must_use]
    pub fn params(&self) -> serde_json::Value {
        match self {
            Self::Write { data, encoding, .. } => serde_json::json!({
                "data": data,
                "encoding": encoding,
            }),
            Self::Flash {
                firmware_data,
                board_fqbn,
                ..
            } => serde_json::json!({
                "firmwareData": firmware_data,
                "boardFqbn": board_fqbn,
            }),
            Self::Restart { .. } => serde_json::json!({}),
        }
    }
}

/// Successful outcome of a dispatched command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    /// Correlation identifier of the command.
    pub command_id: CommandId,
    /// Hub that executed the command.
    pub hub_id: HubId,
    /// Kind of the command.
    pub kind: CommandKind,
    /// Device-reported result payload, if any.
    pub result: Option<serde_json::Value>,
    /// When the response was correlated.
    pub completed_at: DateTime<Utc>,
}

/// Why a dispatched command did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandFailure {
    /// The frame could not be handed to the connection (queue full or closed).
    #[error("failed to hand the command to the hub connection")]
    SendFailed,

    /// No response arrived before the deadline.
    #[error("no response from hub within {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The session was torn down while the command was pending.
    #[error("hub disconnected before the command completed")]
    DeviceDisconnected,

    /// The device answered with a failure status.
    #[error("hub reported failure: {0}")]
    DeviceError(String),
}

impl CommandFailure {
    /// Returns the command-log status recorded for this failure.
    #[must_use]
    pub const fn status(&self) -> CommandStatus {
        match self {
            Self::SendFailed => CommandStatus::SendFailed,
            Self::Timeout(_) => CommandStatus::Timeout,
            Self::DeviceDisconnected => CommandStatus::Disconnected,
            Self::DeviceError(_) => CommandStatus::Failed,
        }
    }
}

/// Lifecycle status of a command as recorded in the command log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Sent, awaiting a response.
    Pending,
    /// The device reported progress but has not finished.
    Running,
    /// The device reported success.
    Completed,
    /// The device reported failure.
    Failed,
    /// The deadline passed without a response.
    Timeout,
    /// The session closed while the command was pending.
    Disconnected,
    /// The frame never reached the connection.
    SendFailed,
}

impl CommandStatus {
    /// Returns `true` once the command can no longer change status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Default per-kind timeouts applied when the operator does not pass one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimeouts {
    /// Default timeout for serial writes.
    pub write: Duration,
    /// Default timeout for firmware flashes.
    pub flash: Duration,
    /// Default timeout for restarts.
    pub restart: Duration,
    /// Upper bound on any operator-supplied timeout.
    pub max: Duration,
}

impl CommandTimeouts {
    /// Returns the default timeout for `kind`.
    #[must_use]
    pub const fn for_kind(&self, kind: CommandKind) -> Duration {
        match kind {
            CommandKind::Write => self.write,
            CommandKind::Flash => self.flash,
            CommandKind::Restart => self.restart,
        }
    }

    /// Resolves the effective timeout: the requested one clamped to
    /// [`Self::max`], or the kind default.
    #[must_use]
    pub fn effective(&self, kind: CommandKind, requested: Option<Duration>) -> Duration {
        requested.map_or_else(|| self.for_kind(kind), |t| t.min(self.max))
    }
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            write: Duration::from_secs(10),
            flash: Duration::from_secs(300),
            restart: Duration::from_secs(30),
            max: Duration::from_secs(600),
        }
    }
}
