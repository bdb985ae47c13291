//! Hub-related DTOs for list and detail operations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{HubId, PortInfo};
use crate::domain::session::{HealthSnapshot, SessionId, SessionState, SessionSummary};
use crate::persistence::models::TelemetryStats;
use crate::service::HubDetail;

/// One connected hub.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HubInfo {
    /// Hub identifier.
    #[schema(value_type = String)]
    pub hub_id: HubId,
    /// Current session identifier.
    #[schema(value_type = String, format = Uuid)]
    pub session_id: SessionId,
    /// Session state.
    pub state: SessionState,
    /// Version announced in the handshake.
    pub version: String,
    /// Peer address of the device socket.
    pub remote_addr: Option<String>,
    /// Handshake completion time.
    pub connected_at: DateTime<Utc>,
    /// Time of the last inbound frame.
    pub last_heartbeat_at: DateTime<Utc>,
}

impl From<SessionSummary> for HubInfo {
    fn from(s: SessionSummary) -> Self {
        Self {
            hub_id: s.hub_id,
            session_id: s.session_id,
            state: s.state,
            version: s.version,
            remote_addr: s.remote_addr,
            connected_at: s.connected_at,
            last_heartbeat_at: s.last_heartbeat_at,
        }
    }
}

/// Response body for `GET /hubs`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HubListResponse {
    /// Connected hubs, sorted by id.
    pub hubs: Vec<HubInfo>,
    /// Number of connected hubs.
    pub count: usize,
}

/// Stored telemetry totals of one hub.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryStatsDto {
    /// Retained record count.
    pub count: usize,
    /// Sum of decoded payload sizes.
    pub total_bytes: u64,
}

impl From<TelemetryStats> for TelemetryStatsDto {
    fn from(s: TelemetryStats) -> Self {
        Self {
            count: s.count,
            total_bytes: s.total_bytes,
        }
    }
}

/// Response body for `GET /hubs/{hub_id}`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HubDetailResponse {
    /// Session information.
    #[serde(flatten)]
    pub hub: HubInfo,
    /// Latest health snapshot, if the hub sent one.
    pub health: Option<HealthSnapshot>,
    /// Stored telemetry totals.
    pub telemetry: TelemetryStatsDto,
}

impl From<HubDetail> for HubDetailResponse {
    fn from(d: HubDetail) -> Self {
        Self {
            hub: d.summary.into(),
            health: d.health,
            telemetry: d.telemetry.into(),
        }
    }
}

/// Response body for `GET /hubs/{hub_id}/ports`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortListResponse {
    /// Hub identifier.
    #[schema(value_type = String)]
    pub hub_id: HubId,
    /// Attached ports, sorted by port id.
    pub ports: Vec<PortInfo>,
    /// Number of attached ports.
    pub count: usize,
}

impl PortListResponse {
    /// Wraps the port list of `hub_id`.
    #[must_use]
    pub fn new(hub_id: HubId, ports: Vec<PortInfo>) -> Self {
        Self {
            hub_id,
            count: ports.len(),
            ports,
        }
    }
}
