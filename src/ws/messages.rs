//! Operator WebSocket message types: envelope and commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level operator WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Builds a message stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error message with a numeric code.
    #[must_use]
    pub fn error(id: impl Into<String>, code: u16, message: &str) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }

    /// Serializes the message; `None` only if serialization fails.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands an operator can send over WebSocket, carried in the payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to events of specific hubs.
    Subscribe {
        /// Hub IDs to subscribe to. Use `["*"]` for all hubs.
        hub_ids: Vec<String>,
    },
    /// Unsubscribe from events of specific hubs.
    Unsubscribe {
        /// Hub IDs to unsubscribe from. `"*"` clears the wildcard.
        hub_ids: Vec<String>,
    },
    /// List the currently connected hubs.
    ListHubs,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_parses_from_payload() {
        let text = r#"{"id":"1","type":"command","timestamp":"2024-01-01T00:00:00Z","payload":{"command":"subscribe","hub_ids":["rpi-bridge-01","*"]}}"#;
        let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
            panic!("envelope should parse");
        };
        assert_eq!(msg.msg_type, WsMessageType::Command);
        let Ok(WsCommand::Subscribe { hub_ids }) = serde_json::from_value(msg.payload) else {
            panic!("subscribe command expected");
        };
        assert_eq!(hub_ids, vec!["rpi-bridge-01", "*"]);
    }

    #[test]
    fn error_message_carries_code() {
        let Some(json) = WsMessage::error("7", 404, "unknown command").to_json() else {
            panic!("error should serialize");
        };
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""code":404"#));
    }
}
