//! Hub handlers: list, detail, ports and telemetry.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{
    HubDetailResponse, HubInfo, HubListResponse, PortListResponse, TelemetryParams,
    TelemetryResponse,
};
use crate::app_state::AppState;
use crate::auth::OperatorAuth;
use crate::domain::HubId;
use crate::error::{ErrorResponse, GatewayError};

/// Parses a path segment into a [`HubId`].
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the segment is blank.
pub(crate) fn parse_hub_id(raw: String) -> Result<HubId, GatewayError> {
    HubId::new(raw).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

/// `GET /hubs`: List connected hubs.
#[utoipa::path(
    get,
    path = "/api/v1/hubs",
    tag = "Hubs",
    summary = "List connected hubs",
    description = "Returns every hub with an active session, sorted by id.",
    responses(
        (status = 200, description = "Connected hubs", body = HubListResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list_hubs(_auth: OperatorAuth, State(state): State<AppState>) -> impl IntoResponse {
    let hubs: Vec<HubInfo> = state
        .hub_service
        .list_hubs()
        .await
        .into_iter()
        .map(Into::into)
        .collect();
    Json(HubListResponse {
        count: hubs.len(),
        hubs,
    })
}

/// `GET /hubs/{hub_id}`: Hub details.
///
/// # Errors
///
/// Returns [`GatewayError::HubNotConnected`] if the hub has no session.
#[utoipa::path(
    get,
    path = "/api/v1/hubs/{hub_id}",
    tag = "Hubs",
    summary = "Get hub details",
    description = "Returns session information, the latest health snapshot and telemetry totals.",
    params(
        ("hub_id" = String, Path, description = "Hub identifier"),
    ),
    responses(
        (status = 200, description = "Hub details", body = HubDetailResponse),
        (status = 404, description = "Hub not connected", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_hub(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(hub_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let hub_id = parse_hub_id(hub_id)?;
    let detail = state.hub_service.hub_detail(&hub_id).await?;
    Ok(Json(HubDetailResponse::from(detail)))
}

/// `GET /hubs/{hub_id}/ports`: Serial ports attached to a hub.
///
/// # Errors
///
/// Returns [`GatewayError::HubNotConnected`] if the hub has no session.
#[utoipa::path(
    get,
    path = "/api/v1/hubs/{hub_id}/ports",
    tag = "Hubs",
    summary = "List attached ports",
    description = "Returns the serial devices the hub reported as connected during its current session.",
    params(
        ("hub_id" = String, Path, description = "Hub identifier"),
    ),
    responses(
        (status = 200, description = "Attached ports", body = PortListResponse),
        (status = 404, description = "Hub not connected", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_ports(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(hub_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let hub_id = parse_hub_id(hub_id)?;
    let ports = state.hub_service.ports(&hub_id).await?;
    Ok(Json(PortListResponse::new(hub_id, ports)))
}

/// `GET /hubs/{hub_id}/telemetry`: Stored telemetry of a hub.
///
/// # Errors
///
/// Returns [`GatewayError::HubNotConnected`] if the hub has no session.
#[utoipa::path(
    get,
    path = "/api/v1/hubs/{hub_id}/telemetry",
    tag = "Hubs",
    summary = "Query telemetry",
    description = "Returns the newest `limit` records received at or after `since`, oldest first.",
    params(
        ("hub_id" = String, Path, description = "Hub identifier"),
        TelemetryParams,
    ),
    responses(
        (status = 200, description = "Telemetry records", body = TelemetryResponse),
        (status = 404, description = "Hub not connected", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_telemetry(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(hub_id): Path<String>,
    Query(params): Query<TelemetryParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let hub_id = parse_hub_id(hub_id)?;
    let records = state
        .hub_service
        .telemetry(&hub_id, &params.to_query())
        .await?;
    Ok(Json(TelemetryResponse::new(hub_id, records)))
}

/// Hub routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hubs", get(list_hubs))
        .route("/hubs/{hub_id}", get(get_hub))
        .route("/hubs/{hub_id}/ports", get(get_ports))
        .route("/hubs/{hub_id}/telemetry", get(get_telemetry))
}
