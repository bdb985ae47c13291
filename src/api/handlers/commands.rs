//! Command handlers: write, flash, restart and the command log.
//!
//! Each dispatch handler blocks until the hub answers, the timeout
//! elapses or the session goes away.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::hubs::parse_hub_id;
use crate::api::dto::{
    CommandLogDto, CommandLogParams, CommandLogResponse, CommandResultResponse,
    FlashCommandRequest, RestartCommandRequest, WriteCommandRequest,
};
use crate::app_state::AppState;
use crate::auth::OperatorAuth;
use crate::domain::CommandId;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /hubs/{hub_id}/commands/write`: Write to a serial port.
///
/// # Errors
///
/// Returns [`GatewayError`] on validation failure, an unconnected hub or
/// a failed command.
#[utoipa::path(
    post,
    path = "/api/v1/hubs/{hub_id}/commands/write",
    tag = "Commands",
    summary = "Serial write",
    description = "Sends a serial write to the hub and waits for its response.",
    params(("hub_id" = String, Path, description = "Hub identifier")),
    request_body = WriteCommandRequest,
    responses(
        (status = 200, description = "Command completed", body = CommandResultResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Hub not connected", body = ErrorResponse),
        (status = 502, description = "Hub reported failure", body = ErrorResponse),
        (status = 503, description = "Send failed or hub disconnected", body = ErrorResponse),
        (status = 504, description = "Command timed out", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn write_command(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(hub_id): Path<String>,
    Json(body): Json<WriteCommandRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let hub_id = parse_hub_id(hub_id)?;
    let (request, timeout) = body.into_command()?;
    let result = state.hub_service.dispatch(&hub_id, request, timeout).await?;
    Ok(Json(CommandResultResponse::from(result)))
}

/// `POST /hubs/{hub_id}/commands/flash`: Flash firmware.
///
/// # Errors
///
/// Returns [`GatewayError`] on validation failure, an unconnected hub or
/// a failed command.
#[utoipa::path(
    post,
    path = "/api/v1/hubs/{hub_id}/commands/flash",
    tag = "Commands",
    summary = "Flash firmware",
    description = "Sends a base64 firmware image to the hub and waits for the flash to finish.",
    params(("hub_id" = String, Path, description = "Hub identifier")),
    request_body = FlashCommandRequest,
    responses(
        (status = 200, description = "Command completed", body = CommandResultResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Hub not connected", body = ErrorResponse),
        (status = 504, description = "Command timed out", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn flash_command(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(hub_id): Path<String>,
    Json(body): Json<FlashCommandRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let hub_id = parse_hub_id(hub_id)?;
    let (request, timeout) = body.into_command()?;
    let result = state.hub_service.dispatch(&hub_id, request, timeout).await?;
    Ok(Json(CommandResultResponse::from(result)))
}

/// `POST /hubs/{hub_id}/commands/restart`: Restart a board.
///
/// # Errors
///
/// Returns [`GatewayError`] on validation failure, an unconnected hub or
/// a failed command.
#[utoipa::path(
    post,
    path = "/api/v1/hubs/{hub_id}/commands/restart",
    tag = "Commands",
    summary = "Restart board",
    description = "Restarts the board attached to a port and waits for the hub to confirm.",
    params(("hub_id" = String, Path, description = "Hub identifier")),
    request_body = RestartCommandRequest,
    responses(
        (status = 200, description = "Command completed", body = CommandResultResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Hub not connected", body = ErrorResponse),
        (status = 504, description = "Command timed out", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn restart_command(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(hub_id): Path<String>,
    Json(body): Json<RestartCommandRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let hub_id = parse_hub_id(hub_id)?;
    let (request, timeout) = body.into_command()?;
    let result = state.hub_service.dispatch(&hub_id, request, timeout).await?;
    Ok(Json(CommandResultResponse::from(result)))
}

/// `GET /hubs/{hub_id}/commands`: Recent commands of a hub.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] on a blank hub id.
#[utoipa::path(
    get,
    path = "/api/v1/hubs/{hub_id}/commands",
    tag = "Commands",
    summary = "List commands",
    description = "Returns the command log of a hub, newest first. Works for disconnected hubs too.",
    params(
        ("hub_id" = String, Path, description = "Hub identifier"),
        CommandLogParams,
    ),
    responses(
        (status = 200, description = "Command log", body = CommandLogResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_commands(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(hub_id): Path<String>,
    Query(params): Query<CommandLogParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let hub_id = parse_hub_id(hub_id)?;
    let commands: Vec<CommandLogDto> = state
        .hub_service
        .commands(&hub_id, params.clamped_limit())
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(CommandLogResponse {
        hub_id,
        count: commands.len(),
        commands,
    }))
}

/// `GET /hubs/{hub_id}/commands/{command_id}`: One command-log entry.
///
/// # Errors
///
/// Returns [`GatewayError::CommandNotFound`] if the id is unknown for
/// that hub.
#[utoipa::path(
    get,
    path = "/api/v1/hubs/{hub_id}/commands/{command_id}",
    tag = "Commands",
    summary = "Get command status",
    description = "Returns the current status, progress and outcome of one command.",
    params(
        ("hub_id" = String, Path, description = "Hub identifier"),
        ("command_id" = uuid::Uuid, Path, description = "Command UUID"),
    ),
    responses(
        (status = 200, description = "Command status", body = CommandLogDto),
        (status = 404, description = "Command not found", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_command(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path((hub_id, command_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, GatewayError> {
    let hub_id = parse_hub_id(hub_id)?;
    let command_id: CommandId = command_id
        .parse()
        .map_err(|_| GatewayError::CommandNotFound(command_id.clone()))?;
    let entry = state.hub_service.command_status(&hub_id, command_id)?;
    Ok(Json(CommandLogDto::from(entry)))
}

/// Command routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hubs/{hub_id}/commands", get(list_commands))
        .route("/hubs/{hub_id}/commands/write", post(write_command))
        .route("/hubs/{hub_id}/commands/flash", post(flash_command))
        .route("/hubs/{hub_id}/commands/restart", post(restart_command))
        .route("/hubs/{hub_id}/commands/{command_id}", get(get_command))
}
