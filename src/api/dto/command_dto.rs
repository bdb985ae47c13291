//! Command request bodies, results and command-log rows.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::command::{CommandKind, CommandStatus};
use crate::domain::{CommandId, CommandRequest, CommandResult, HubId};
use crate::error::GatewayError;
use crate::persistence::models::CommandLogEntry;

/// Request body for `POST /hubs/{hub_id}/commands/write`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteCommandRequest {
    /// Target serial port.
    pub port_id: String,
    /// Payload to write.
    pub data: String,
    /// Payload encoding. Defaults to `utf-8`.
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Hub-side priority (1 = highest, 10 = lowest). Defaults to 5.
    #[serde(default = "default_write_priority")]
    pub priority: u8,
    /// Timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Request body for `POST /hubs/{hub_id}/commands/flash`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlashCommandRequest {
    /// Target serial port.
    pub port_id: String,
    /// Base64-encoded firmware image.
    pub firmware_data: String,
    /// Fully qualified board name.
    #[serde(default)]
    pub board_fqbn: Option<String>,
    /// Hub-side priority. Defaults to 3.
    #[serde(default = "default_flash_priority")]
    pub priority: u8,
    /// Timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Request body for `POST /hubs/{hub_id}/commands/restart`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestartCommandRequest {
    /// Target serial port.
    pub port_id: String,
    /// Hub-side priority. Defaults to 2.
    #[serde(default = "default_restart_priority")]
    pub priority: u8,
    /// Timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

const fn default_write_priority() -> u8 {
    5
}

const fn default_flash_priority() -> u8 {
    3
}

const fn default_restart_priority() -> u8 {
    2
}

fn check_common(
    port_id: &str,
    priority: u8,
    timeout_ms: Option<u64>,
) -> Result<Option<Duration>, GatewayError> {
    if port_id.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("portId must not be empty".to_string()));
    }
    if !(1..=10).contains(&priority) {
        return Err(GatewayError::InvalidRequest(format!(
            "priority must be between 1 and 10, got {priority}"
        )));
    }
    match timeout_ms {
        Some(0) => Err(GatewayError::InvalidRequest(
            "timeoutMs must be positive".to_string(),
        )),
        other => Ok(other.map(Duration::from_millis)),
    }
}

impl WriteCommandRequest {
    /// Validates the body and returns the command plus its timeout override.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] on an empty port, a
    /// priority outside `1..=10` or a zero timeout.
    pub fn into_command(self) -> Result<(CommandRequest, Option<Duration>), GatewayError> {
        let timeout = check_common(&self.port_id, self.priority, self.timeout_ms)?;
        Ok((
            CommandRequest::Write {
                port_id: self.port_id,
                data: self.data,
                encoding: self.encoding,
                priority: self.priority,
            },
            timeout,
        ))
    }
}

impl FlashCommandRequest {
    /// Validates the body and returns the command plus its timeout override.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] on the same conditions as
    /// writes, or if `firmwareData` is not valid base64.
    pub fn into_command(self) -> Result<(CommandRequest, Option<Duration>), GatewayError> {
        let timeout = check_common(&self.port_id, self.priority, self.timeout_ms)?;
        if self.firmware_data.is_empty() || STANDARD.decode(&self.firmware_data).is_err() {
            return Err(GatewayError::InvalidRequest(
                "firmwareData must be non-empty base64".to_string(),
            ));
        }
        Ok((
            CommandRequest::Flash {
                port_id: self.port_id,
                firmware_data: self.firmware_data,
                board_fqbn: self.board_fqbn,
                priority: self.priority,
            },
            timeout,
        ))
    }
}

impl RestartCommandRequest {
    /// Validates the body and returns the command plus its timeout override.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] on an empty port, a
    /// priority outside `1..=10` or a zero timeout.
    pub fn into_command(self) -> Result<(CommandRequest, Option<Duration>), GatewayError> {
        let timeout = check_common(&self.port_id, self.priority, self.timeout_ms)?;
        Ok((
            CommandRequest::Restart {
                port_id: self.port_id,
                priority: self.priority,
            },
            timeout,
        ))
    }
}

/// Response body for a completed command.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandResultResponse {
    /// Correlation identifier.
    #[schema(value_type = String, format = Uuid)]
    pub command_id: CommandId,
    /// Hub that executed the command.
    #[schema(value_type = String)]
    pub hub_id: HubId,
    /// Command kind.
    pub kind: CommandKind,
    /// Always `completed`.
    pub status: CommandStatus,
    /// Device result payload.
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
    /// Correlation time.
    pub completed_at: DateTime<Utc>,
}

impl From<CommandResult> for CommandResultResponse {
    fn from(r: CommandResult) -> Self {
        Self {
            command_id: r.command_id,
            hub_id: r.hub_id,
            kind: r.kind,
            status: CommandStatus::Completed,
            result: r.result,
            completed_at: r.completed_at,
        }
    }
}

/// One command-log row.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandLogDto {
    /// Correlation identifier.
    #[schema(value_type = String, format = Uuid)]
    pub command_id: CommandId,
    /// Target hub.
    #[schema(value_type = String)]
    pub hub_id: HubId,
    /// Command kind.
    pub kind: CommandKind,
    /// Target port.
    pub port_id: String,
    /// Current status.
    pub status: CommandStatus,
    /// Last reported progress in percent.
    pub progress: Option<f64>,
    /// Device result payload.
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
    /// Failure description.
    pub error: Option<String>,
    /// Dispatch time.
    pub issued_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl From<CommandLogEntry> for CommandLogDto {
    fn from(e: CommandLogEntry) -> Self {
        Self {
            command_id: e.command_id,
            hub_id: e.hub_id,
            kind: e.kind,
            port_id: e.port_id,
            status: e.status,
            progress: e.progress,
            result: e.result,
            error: e.error,
            issued_at: e.issued_at,
            updated_at: e.updated_at,
        }
    }
}

/// Query parameters for `GET /hubs/{hub_id}/commands`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CommandLogParams {
    /// Maximum number of entries (1..=500). Defaults to 50.
    #[serde(default = "default_log_limit")]
    pub limit: usize,
}

const fn default_log_limit() -> usize {
    50
}

impl CommandLogParams {
    /// Returns `limit` clamped to `1..=500`.
    #[must_use]
    pub fn clamped_limit(&self) -> usize {
        self.limit.clamp(1, 500)
    }
}

/// Response body for `GET /hubs/{hub_id}/commands`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandLogResponse {
    /// Hub the entries belong to.
    #[schema(value_type = String)]
    pub hub_id: HubId,
    /// Entries, newest first.
    pub commands: Vec<CommandLogDto>,
    /// Number of returned entries.
    pub count: usize,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn write_defaults_apply() {
        let Ok(req) = serde_json::from_str::<WriteCommandRequest>(
            r#"{"portId":"ttyUSB0","data":"hello"}"#,
        ) else {
            panic!("write body should parse");
        };
        assert_eq!(req.encoding, "utf-8");
        assert_eq!(req.priority, 5);
        let Ok((CommandRequest::Write { priority, .. }, None)) = req.into_command() else {
            panic!("valid write expected");
        };
        assert_eq!(priority, 5);
    }

    #[test]
    fn priority_out_of_range_is_rejected() {
        let req = RestartCommandRequest {
            port_id: "ttyUSB0".to_string(),
            priority: 11,
            timeout_ms: None,
        };
        assert!(matches!(
            req.into_command(),
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn flash_requires_base64() {
        let req = FlashCommandRequest {
            port_id: "ttyUSB0".to_string(),
            firmware_data: "not base64!".to_string(),
            board_fqbn: None,
            priority: 3,
            timeout_ms: Some(1000),
        };
        assert!(req.into_command().is_err());

        let req = FlashCommandRequest {
            port_id: "ttyUSB0".to_string(),
            firmware_data: "AAEC".to_string(),
            board_fqbn: Some("arduino:avr:uno".to_string()),
            priority: 3,
            timeout_ms: Some(1000),
        };
        let Ok((_, Some(timeout))) = req.into_command() else {
            panic!("valid flash expected");
        };
        assert_eq!(timeout, Duration::from_secs(1));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let req = RestartCommandRequest {
            port_id: "ttyUSB0".to_string(),
            priority: 2,
            timeout_ms: Some(0),
        };
        assert!(req.into_command().is_err());
    }
}
