//! Persistence layer: telemetry store and command log.
//!
//! The service depends only on the [`TelemetryStore`] and
//! [`CommandLogStore`] traits. [`memory::MemoryStore`] is the bundled
//! in-process implementation with bounded retention; durable backends
//! plug in behind the same traits.

pub mod memory;
pub mod models;

use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::domain::HubId;
use crate::domain::command::{CommandId, CommandStatus};
use models::{CommandLogEntry, TelemetryQuery, TelemetryRecord, TelemetryStats};

pub use memory::MemoryStore;

/// Append-only telemetry storage partitioned by hub.
///
/// Methods are synchronous and must not block: they are called from the
/// connection read loop.
pub trait TelemetryStore: Send + Sync + Debug {
    /// Appends a record, applying the store's retention policy.
    fn append(&self, record: TelemetryRecord);

    /// Returns matching records for `hub_id` in ascending sequence order.
    fn query(&self, hub_id: &HubId, query: &TelemetryQuery) -> Vec<TelemetryRecord>;

    /// Returns count and byte totals for `hub_id`.
    fn stats(&self, hub_id: &HubId) -> TelemetryStats;
}

/// Terminal or intermediate status change for a logged command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandUpdate {
    /// New status.
    pub status: CommandStatus,
    /// Reported progress, in percent.
    pub progress: Option<f64>,
    /// Device result payload.
    pub result: Option<serde_json::Value>,
    /// Failure description.
    pub error: Option<String>,
    /// When the change happened.
    pub at: DateTime<Utc>,
}

/// Record of every dispatched command and its status history head.
pub trait CommandLogStore: Send + Sync + Debug {
    /// Records a newly dispatched command.
    fn log_issued(&self, entry: CommandLogEntry);

    /// Applies `update` to an existing entry.
    ///
    /// Returns `false` if the entry is unknown or already terminal.
    fn log_update(&self, command_id: &CommandId, update: CommandUpdate) -> bool;

    /// Returns one entry.
    fn command(&self, command_id: &CommandId) -> Option<CommandLogEntry>;

    /// Returns up to `limit` entries for `hub_id`, newest first.
    fn commands(&self, hub_id: &HubId, limit: usize) -> Vec<CommandLogEntry>;
}
