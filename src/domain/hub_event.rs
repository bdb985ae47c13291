//! Domain events reflecting hub activity.
//!
//! Session lifecycle changes, telemetry, health snapshots, port changes
//! and command resolutions emit a [`HubEvent`] through the [`super::EventBus`]. Events
//! are broadcast to operator WebSocket subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::HubId;
use super::command::{CommandId, CommandKind, CommandStatus};
use super::port::PortEventKind;
use super::session::{CloseReason, HealthSnapshot, SessionId};

/// Domain event emitted by the hub service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum HubEvent {
    /// A hub completed its handshake and became active.
    HubConnected {
        /// Hub identifier.
        hub_id: HubId,
        /// Server-assigned session identifier.
        session_id: SessionId,
        /// Announced hub version.
        version: String,
        /// Connection timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A hub session was torn down.
    HubDisconnected {
        /// Hub identifier.
        hub_id: HubId,
        /// Session that closed.
        session_id: SessionId,
        /// Why it closed.
        reason: CloseReason,
        /// Disconnection timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A telemetry record was stored.
    Telemetry {
        /// Hub identifier.
        hub_id: HubId,
        /// Store sequence number.
        sequence: u64,
        /// Serial port that produced the data.
        port_id: String,
        /// Device-side serial session, if reported.
        session_id: Option<String>,
        /// Base64 payload.
        data: String,
        /// Decoded payload size.
        data_size_bytes: usize,
        /// Server receive time.
        timestamp: DateTime<Utc>,
    },

    /// A hub pushed a health snapshot.
    Health {
        /// Hub identifier.
        hub_id: HubId,
        /// The snapshot.
        snapshot: HealthSnapshot,
    },

    /// A serial device was attached to or detached from a hub.
    DeviceEvent {
        /// Hub identifier.
        hub_id: HubId,
        /// Hub-side port identifier.
        port_id: String,
        /// Connected or disconnected.
        event: PortEventKind,
        /// Server receive time.
        timestamp: DateTime<Utc>,
    },

    /// A dispatched command reached a terminal status.
    CommandResolved {
        /// Hub identifier.
        hub_id: HubId,
        /// Correlation identifier.
        command_id: CommandId,
        /// Command kind.
        kind: CommandKind,
        /// Terminal status.
        status: CommandStatus,
        /// Failure description, if any.
        error: Option<String>,
        /// Resolution timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl HubEvent {
    /// Returns the hub associated with this event.
    #[must_use]
    pub const fn hub_id(&self) -> &HubId {
        match self {
            Self::HubConnected { hub_id, .. }
            | Self::HubDisconnected { hub_id, .. }
            | Self::Telemetry { hub_id, .. }
            | Self::Health { hub_id, .. }
            | Self::DeviceEvent { hub_id, .. }
            | Self::CommandResolved { hub_id, .. } => hub_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::HubConnected { .. } => "hub_connected",
            Self::HubDisconnected { .. } => "hub_disconnected",
            Self::Telemetry { .. } => "telemetry",
            Self::Health { .. } => "health",
            Self::DeviceEvent { .. } => "device_event",
            Self::CommandResolved { .. } => "command_resolved",
        }
    }
}
