//! Telemetry query parameters and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::HubId;
use crate::persistence::models::{TelemetryQuery, TelemetryRecord};

/// Upper bound for `limit`.
pub const MAX_TELEMETRY_LIMIT: usize = 1000;

/// Query parameters for `GET /hubs/{hub_id}/telemetry`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TelemetryParams {
    /// Maximum number of records (1..=1000). Defaults to 100.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Only records received at or after this RFC 3339 time.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

fn default_limit() -> usize {
    100
}

impl TelemetryParams {
    /// Clamps `limit` into `1..=1000` and builds the store query.
    #[must_use]
    pub fn to_query(&self) -> TelemetryQuery {
        TelemetryQuery {
            limit: self.limit.clamp(1, MAX_TELEMETRY_LIMIT),
            since: self.since,
        }
    }
}

/// One stored telemetry record.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecordDto {
    /// Monotonic sequence number.
    pub sequence: u64,
    /// Server receive time.
    pub timestamp: DateTime<Utc>,
    /// Serial port that produced the data.
    pub port_id: String,
    /// Device-side serial session.
    pub session_id: Option<String>,
    /// Base64 payload.
    pub data: String,
    /// Decoded payload size.
    pub data_size_bytes: usize,
}

impl From<TelemetryRecord> for TelemetryRecordDto {
    fn from(r: TelemetryRecord) -> Self {
        Self {
            sequence: r.sequence,
            timestamp: r.timestamp,
            port_id: r.port_id,
            session_id: r.session_id,
            data: r.data,
            data_size_bytes: r.data_size_bytes,
        }
    }
}

/// Response body for `GET /hubs/{hub_id}/telemetry`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryResponse {
    /// Hub the records belong to.
    #[schema(value_type = String)]
    pub hub_id: HubId,
    /// Records, oldest first.
    pub telemetry: Vec<TelemetryRecordDto>,
    /// Number of returned records.
    pub count: usize,
    /// Sum of decoded sizes of the returned records.
    pub total_bytes: u64,
}

impl TelemetryResponse {
    /// Builds the response from query results.
    #[must_use]
    pub fn new(hub_id: HubId, records: Vec<TelemetryRecord>) -> Self {
        let total_bytes = records
            .iter()
            .map(|r| u64::try_from(r.data_size_bytes).unwrap_or(u64::MAX))
            .fold(0u64, u64::saturating_add);
        let telemetry: Vec<TelemetryRecordDto> = records.into_iter().map(Into::into).collect();
        Self {
            hub_id,
            count: telemetry.len(),
            telemetry,
            total_bytes,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        let params = TelemetryParams {
            limit: 5000,
            since: None,
        };
        assert_eq!(params.to_query().limit, MAX_TELEMETRY_LIMIT);
        let params = TelemetryParams {
            limit: 0,
            since: None,
        };
        assert_eq!(params.to_query().limit, 1);
    }

    #[test]
    fn response_sums_sizes() {
        let Ok(hub) = HubId::new("H1") else {
            panic!("valid hub id");
        };
        let record = |sequence, size| TelemetryRecord {
            sequence,
            hub_id: hub.clone(),
            timestamp: Utc::now(),
            port_id: "ttyUSB0".to_string(),
            session_id: None,
            data: String::new(),
            data_size_bytes: size,
        };
        let resp = TelemetryResponse::new(hub.clone(), vec![record(1, 3), record(2, 4)]);
        assert_eq!(resp.count, 2);
        assert_eq!(resp.total_bytes, 7);
    }
}
