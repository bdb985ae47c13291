//! Axum WebSocket upgrade handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;

use super::device::run_device_connection;
use super::operator::run_operator_connection;
use crate::app_state::AppState;
use crate::auth::OperatorAuth;

/// `GET /hub`: Upgrade a device connection.
///
/// Authentication happens inside the socket via the `hub_connect` frame.
pub async fn device_ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let hub_service = Arc::clone(&state.hub_service);
    let settings = state.device_link;

    ws.on_upgrade(move |socket| {
        run_device_connection(socket, hub_service, settings, Some(addr.to_string()))
    })
}

/// `GET /ws`: Upgrade an operator event stream.
pub async fn operator_ws_handler(
    _auth: OperatorAuth,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let event_rx = state.event_bus.subscribe();
    let hub_service = Arc::clone(&state.hub_service);

    ws.on_upgrade(move |socket| run_operator_connection(socket, event_rx, hub_service))
}
