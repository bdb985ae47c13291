//! Stored record types for telemetry and the command log.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::HubId;
use crate::domain::command::{CommandId, CommandKind, CommandStatus};

/// Telemetry as decoded from a device frame, before the sink stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySample {
    /// Serial port that produced the data.
    pub port_id: String,
    /// Device-side serial session, if reported.
    pub session_id: Option<String>,
    /// Base64 payload, kept verbatim.
    pub data: String,
    /// Size of the decoded payload.
    pub data_size_bytes: usize,
}

/// An immutable stored telemetry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryRecord {
    /// Process-wide monotonic sequence number.
    pub sequence: u64,
    /// Hub that pushed the data.
    pub hub_id: HubId,
    /// Server receive time.
    pub timestamp: DateTime<Utc>,
    /// Serial port that produced the data.
    pub port_id: String,
    /// Device-side serial session, if reported.
    pub session_id: Option<String>,
    /// Base64 payload.
    pub data: String,
    /// Size of the decoded payload.
    pub data_size_bytes: usize,
}

/// Filter for [`super::TelemetryStore::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryQuery {
    /// Keep at most this many of the newest matching records.
    pub limit: usize,
    /// Keep only records received at or after this time.
    pub since: Option<DateTime<Utc>>,
}

/// Aggregate figures for one hub's stored telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryStats {
    /// Number of retained records.
    pub count: usize,
    /// Sum of decoded payload sizes.
    pub total_bytes: u64,
}

/// One row of the command log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandLogEntry {
    /// Correlation identifier.
    pub command_id: CommandId,
    /// Target hub.
    pub hub_id: HubId,
    /// Command kind.
    pub kind: CommandKind,
    /// Target port.
    pub port_id: String,
    /// Current status.
    pub status: CommandStatus,
    /// Last reported progress, in percent.
    pub progress: Option<f64>,
    /// Device result payload.
    pub result: Option<serde_json::Value>,
    /// Failure description.
    pub error: Option<String>,
    /// When the command was dispatched.
    pub issued_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl CommandLogEntry {
    /// Creates a `pending` entry for a freshly dispatched command.
    #[must_use]
    pub fn pending(
        command_id: CommandId,
        hub_id: HubId,
        kind: CommandKind,
        port_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            command_id,
            hub_id,
            kind,
            port_id: port_id.into(),
            status: CommandStatus::Pending,
            progress: None,
            result: None,
            error: None,
            issued_at: now,
            updated_at: now,
        }
    }
}

/// Bounds applied by a store to what it retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum telemetry records kept per hub; the oldest are evicted first.
    pub max_records_per_hub: usize,
    /// Maximum telemetry age, or `None` for no age bound.
    pub max_age: Option<Duration>,
    /// Maximum command-log entries kept per hub.
    pub max_commands_per_hub: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_records_per_hub: 1000,
            max_age: None,
            max_commands_per_hub: 500,
        }
    }
}
