//! JSON text frames exchanged with hub devices.
//!
//! Every frame carries a `type` discriminant. Inbound frames after the
//! handshake are classified into [`InboundFrame`]; anything that does not
//! decode cleanly becomes [`InboundFrame::Malformed`] so the connection
//! loop can log and drop it without tearing the session down.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::HubId;
use crate::domain::command::{CommandId, CommandRequest};
use crate::domain::port::{PortEvent, PortEventKind};
use crate::domain::session::{HealthSnapshot, SessionId};
use crate::persistence::models::TelemetrySample;

/// Why a device frame could not be decoded or encoded.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Not valid JSON, unknown `type`, or missing fields.
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Telemetry `data` is not valid base64.
    #[error("telemetry payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Binary WebSocket frames are not part of the protocol.
    #[error("binary frames are not supported")]
    Binary,
}

/// The `hub_connect` frame a device must send first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Hub identifier the device claims.
    pub hub_id: HubId,
    /// Provisioned device token.
    pub device_token: String,
    /// Hub service version.
    #[serde(default)]
    pub version: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HandshakeFrame {
    HubConnect(Handshake),
}

/// Decodes the first frame of a device connection.
///
/// # Errors
///
/// Returns [`FrameError::Json`] if the text is not a well-formed
/// `hub_connect` frame.
pub fn decode_handshake(text: &str) -> Result<Handshake, FrameError> {
    let HandshakeFrame::HubConnect(handshake) = serde_json::from_str(text)?;
    Ok(handshake)
}

/// Status a device reports for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Finished successfully.
    #[serde(alias = "success")]
    Completed,
    /// Finished with an error.
    #[serde(alias = "error")]
    Failed,
    /// Still executing; carries progress only.
    Running,
}

/// A device's answer to a command frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    /// Correlation id echoed from the command frame, kept raw so an
    /// unparseable id can be logged and discarded.
    #[serde(alias = "taskId")]
    pub command_id: String,
    /// Reported status.
    pub status: ResponseStatus,
    /// Progress in percent.
    #[serde(default)]
    pub progress: Option<f64>,
    /// Result payload.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error description.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTelemetry {
    port_id: String,
    #[serde(default)]
    session_id: Option<String>,
    data: String,
}

#[derive(Deserialize)]
struct WireHeartbeat {
    #[serde(default)]
    uptime_seconds: Option<u64>,
    #[serde(default)]
    system: Option<serde_json::Value>,
    #[serde(default)]
    service: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

impl WireHeartbeat {
    fn into_snapshot(self) -> Option<HealthSnapshot> {
        let carries_metrics = self.uptime_seconds.is_some()
            || self.system.is_some()
            || self.service.is_some()
            || self.errors.is_some();
        carries_metrics.then(|| HealthSnapshot {
            received_at: Utc::now(),
            uptime_seconds: self.uptime_seconds,
            system: self.system.unwrap_or_default(),
            service: self.service.unwrap_or_default(),
            errors: self.errors.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDeviceEvent {
    event_type: PortEventKind,
    port_id: String,
    #[serde(default)]
    device_info: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireFrame {
    #[serde(alias = "task_status")]
    CommandResponse(CommandResponse),
    Telemetry(WireTelemetry),
    #[serde(alias = "health")]
    Heartbeat(WireHeartbeat),
    DeviceEvent(WireDeviceEvent),
}

/// A classified inbound frame.
#[derive(Debug)]
pub enum InboundFrame {
    /// Answer to a pending command.
    CommandResponse(CommandResponse),
    /// Unsolicited telemetry.
    Telemetry(TelemetrySample),
    /// Liveness ping, optionally carrying health metrics.
    Heartbeat(Option<HealthSnapshot>),
    /// A serial device was attached to or detached from the hub.
    DeviceEvent(PortEvent),
    /// Anything that failed to decode.
    Malformed(FrameError),
}

impl InboundFrame {
    /// Returns a short label for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CommandResponse(_) => "command_response",
            Self::Telemetry(_) => "telemetry",
            Self::Heartbeat(_) => "heartbeat",
            Self::DeviceEvent(_) => "device_event",
            Self::Malformed(_) => "malformed",
        }
    }
}

/// Classifies a text frame received after the handshake.
#[must_use]
pub fn classify(text: &str) -> InboundFrame {
    let frame = match serde_json::from_str::<WireFrame>(text) {
        Ok(frame) => frame,
        Err(e) => return InboundFrame::Malformed(e.into()),
    };
    match frame {
        WireFrame::CommandResponse(response) => InboundFrame::CommandResponse(response),
        WireFrame::Heartbeat(heartbeat) => InboundFrame::Heartbeat(heartbeat.into_snapshot()),
        WireFrame::DeviceEvent(event) => InboundFrame::DeviceEvent(PortEvent {
            kind: event.event_type,
            port_id: event.port_id,
            device_info: event.device_info,
        }),
        WireFrame::Telemetry(telemetry) => match STANDARD.decode(&telemetry.data) {
            Ok(bytes) => InboundFrame::Telemetry(TelemetrySample {
                port_id: telemetry.port_id,
                session_id: telemetry.session_id,
                data: telemetry.data,
                data_size_bytes: bytes.len(),
            }),
            Err(e) => InboundFrame::Malformed(e.into()),
        },
    }
}

/// Acknowledgement sent once the session is active.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubConnectedAck {
    /// Accepted hub identifier.
    pub hub_id: HubId,
    /// Server-assigned session identifier.
    pub session_id: SessionId,
    /// Server time.
    pub timestamp: DateTime<Utc>,
}

/// Body of a `command` frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    /// Correlation id the device must echo.
    pub command_id: CommandId,
    /// Wire name of the command kind.
    pub command_type: &'static str,
    /// Target port.
    pub port_id: String,
    /// Kind-specific parameters.
    pub params: serde_json::Value,
    /// Hub-side queue priority.
    pub priority: u8,
}

/// Frames the server sends to a device.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted.
    HubConnected(HubConnectedAck),
    /// Operator command.
    Command {
        /// The command.
        command: CommandEnvelope,
    },
}

impl ServerFrame {
    /// Builds the acknowledgement for a freshly activated session.
    #[must_use]
    pub fn hub_connected(hub_id: HubId, session_id: SessionId) -> Self {
        Self::HubConnected(HubConnectedAck {
            hub_id,
            session_id,
            timestamp: Utc::now(),
        })
    }

    /// Builds the frame for `request` tagged with `command_id`.
    #[must_use]
    pub fn command(command_id: CommandId, request: &CommandRequest) -> Self {
        Self::Command {
            command: CommandEnvelope {
                command_id,
                command_type: request.kind().wire_name(),
                port_id: request.port_id().to_string(),
                params: request.params(),
                priority: request.priority(),
            },
        }
    }

    /// Serializes the frame to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decodes_handshake() {
        let text = r#"{"type":"hub_connect","hubId":"rpi-bridge-01","deviceToken":"tok","version":"2.1.0"}"#;
        let Ok(handshake) = decode_handshake(text) else {
            panic!("handshake should decode");
        };
        assert_eq!(handshake.hub_id.as_str(), "rpi-bridge-01");
        assert_eq!(handshake.device_token, "tok");
        assert_eq!(handshake.version, "2.1.0");
    }

    #[test]
    fn rejects_non_handshake_first_frame() {
        assert!(decode_handshake(r#"{"type":"heartbeat"}"#).is_err());
        assert!(decode_handshake(r#"{"type":"hub_connect","hubId":"","deviceToken":"t"}"#).is_err());
        assert!(decode_handshake("not json").is_err());
    }

    #[test]
    fn classifies_command_response_and_task_status_alias() {
        let InboundFrame::CommandResponse(response) =
            classify(r#"{"type":"command_response","commandId":"abc","status":"completed","result":{"bytes":2}}"#)
        else {
            panic!("expected command response");
        };
        assert_eq!(response.command_id, "abc");
        assert_eq!(response.status, ResponseStatus::Completed);
        assert_eq!(response.result, Some(serde_json::json!({"bytes": 2})));

        let InboundFrame::CommandResponse(progress) =
            classify(r#"{"type":"task_status","taskId":"xyz","status":"running","progress":40}"#)
        else {
            panic!("expected task status");
        };
        assert_eq!(progress.command_id, "xyz");
        assert_eq!(progress.status, ResponseStatus::Running);
        assert_eq!(progress.progress, Some(40.0));
    }

    #[test]
    fn classifies_telemetry_with_decoded_size() {
        let InboundFrame::Telemetry(sample) =
            classify(r#"{"type":"telemetry","portId":"ttyUSB0","sessionId":"s1","data":"aGVsbG8="}"#)
        else {
            panic!("expected telemetry");
        };
        assert_eq!(sample.port_id, "ttyUSB0");
        assert_eq!(sample.session_id.as_deref(), Some("s1"));
        assert_eq!(sample.data_size_bytes, 5);
    }

    #[test]
    fn bad_base64_is_malformed() {
        let frame = classify(r#"{"type":"telemetry","portId":"p","data":"***"}"#);
        assert!(matches!(frame, InboundFrame::Malformed(FrameError::InvalidBase64(_))));
    }

    #[test]
    fn plain_heartbeat_has_no_snapshot() {
        let frame = classify(r#"{"type":"heartbeat","timestamp":"2024-01-01T00:00:00Z"}"#);
        assert!(matches!(frame, InboundFrame::Heartbeat(None)));
    }

    #[test]
    fn health_frame_carries_snapshot() {
        let InboundFrame::Heartbeat(Some(snapshot)) =
            classify(r#"{"type":"health","uptime_seconds":3600,"system":{"cpu":{"percent":5}}}"#)
        else {
            panic!("expected health snapshot");
        };
        assert_eq!(snapshot.uptime_seconds, Some(3600));
        assert_eq!(snapshot.service, serde_json::Value::Null);
    }

    #[test]
    fn classifies_device_event() {
        let InboundFrame::DeviceEvent(event) = classify(
            r#"{"type":"device_event","hubId":"H1","timestamp":"2024-01-01T00:00:00Z","eventType":"connected","portId":"ttyUSB0","deviceInfo":{"port":"/dev/ttyUSB0"}}"#,
        ) else {
            panic!("expected device event");
        };
        assert_eq!(event.kind, PortEventKind::Connected);
        assert_eq!(event.port_id, "ttyUSB0");
        assert!(event.device_info.is_some());

        let InboundFrame::DeviceEvent(event) =
            classify(r#"{"type":"device_event","eventType":"disconnected","portId":"ttyUSB0"}"#)
        else {
            panic!("expected device event");
        };
        assert_eq!(event.kind, PortEventKind::Disconnected);
        assert!(event.device_info.is_none());

        assert!(matches!(
            classify(r#"{"type":"device_event","eventType":"exploded","portId":"p"}"#),
            InboundFrame::Malformed(_)
        ));
    }

    #[test]
    fn unknown_type_and_missing_fields_are_malformed() {
        assert!(matches!(classify(r#"{"type":"reboot"}"#), InboundFrame::Malformed(_)));
        assert!(matches!(
            classify(r#"{"type":"command_response","status":"completed"}"#),
            InboundFrame::Malformed(_)
        ));
        assert!(matches!(classify("{"), InboundFrame::Malformed(_)));
    }

    #[test]
    fn command_frame_shape() {
        let id = CommandId::new();
        let request = CommandRequest::Write {
            port_id: "ttyUSB0".to_string(),
            data: "AA".to_string(),
            encoding: "utf-8".to_string(),
            priority: 5,
        };
        let Ok(text) = ServerFrame::command(id, &request).encode() else {
            panic!("command frame should encode");
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
            panic!("encoded frame should be JSON");
        };
        assert_eq!(
            value,
            serde_json::json!({
                "type": "command",
                "command": {
                    "commandId": id.to_string(),
                    "commandType": "serial_write",
                    "portId": "ttyUSB0",
                    "params": {"data": "AA", "encoding": "utf-8"},
                    "priority": 5
                }
            })
        );
    }

    #[test]
    fn ack_frame_is_tagged() {
        let Ok(hub_id) = HubId::new("H1") else {
            panic!("valid hub id");
        };
        let Ok(text) = ServerFrame::hub_connected(hub_id, SessionId::new()).encode() else {
            panic!("ack should encode");
        };
        assert!(text.contains(r#""type":"hub_connected""#));
        assert!(text.contains(r#""hubId":"H1""#));
    }
}
