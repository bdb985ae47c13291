//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::HubId;
use crate::domain::command::{CommandFailure, CommandId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "hub not connected: rpi-bridge-01",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`GatewayError`] code ranges).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                    |
/// |-----------|-------------------|--------------------------------|
/// | 1000–1999 | Validation / auth | 400 Bad Request / 401          |
/// | 2000–2999 | State/Not Found   | 404 Not Found                  |
/// | 3000–3999 | Server            | 500 Internal Server Error      |
/// | 4000–4999 | Command / device  | 502 / 503 / 504                |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A device handshake was malformed or rejected.
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Missing or unknown operator credentials.
    #[error("missing or invalid operator token")]
    Unauthorized,

    /// No active session exists for the hub.
    #[error("hub not connected: {0}")]
    HubNotConnected(HubId),

    /// No command-log entry exists for the id.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// A dispatched command did not complete successfully.
    #[error("command {command_id} failed: {failure}")]
    CommandFailed {
        /// Correlation id of the failed command.
        command_id: CommandId,
        /// What went wrong.
        #[source]
        failure: CommandFailure,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidHandshake(_) => 1002,
            Self::Unauthorized => 1003,
            Self::HubNotConnected(_) => 2001,
            Self::CommandNotFound(_) => 2002,
            Self::Internal(_) => 3000,
            Self::CommandFailed { failure, .. } => match failure {
                CommandFailure::SendFailed => 4001,
                CommandFailure::Timeout(_) => 4002,
                CommandFailure::DeviceDisconnected => 4003,
                CommandFailure::DeviceError(_) => 4004,
            },
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidHandshake(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::HubNotConnected(_) | Self::CommandNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CommandFailed { failure, .. } => match failure {
                CommandFailure::SendFailed | CommandFailure::DeviceDisconnected => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                CommandFailure::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                CommandFailure::DeviceError(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::CommandFailed { command_id, .. } => Some(command_id.to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_json(err: GatewayError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body should be readable");
        };
        let Ok(value) = serde_json::from_slice(&bytes) else {
            panic!("body should be JSON");
        };
        (status, value)
    }

    #[tokio::test]
    async fn hub_not_connected_is_404() {
        let Ok(hub) = HubId::new("rpi-bridge-01") else {
            panic!("valid hub id");
        };
        let (status, body) = body_json(GatewayError::HubNotConnected(hub)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.pointer("/error/code"), Some(&serde_json::json!(2001)));
        assert!(body.pointer("/error/details").is_none());
    }

    #[tokio::test]
    async fn command_timeout_is_504_with_command_id() {
        let command_id = CommandId::new();
        let err = GatewayError::CommandFailed {
            command_id,
            failure: CommandFailure::Timeout(Duration::from_secs(1)),
        };
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body.pointer("/error/code"), Some(&serde_json::json!(4002)));
        assert_eq!(
            body.pointer("/error/details"),
            Some(&serde_json::json!(command_id.to_string()))
        );
    }

    #[test]
    fn device_failures_map_to_gateway_statuses() {
        let failed = |failure| GatewayError::CommandFailed {
            command_id: CommandId::new(),
            failure,
        };
        assert_eq!(
            failed(CommandFailure::SendFailed).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            failed(CommandFailure::DeviceDisconnected).error_code(),
            4003
        );
        assert_eq!(
            failed(CommandFailure::DeviceError("port busy".to_string())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(GatewayError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }
}
