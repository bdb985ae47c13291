//! Router assembly and the serving loop.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::ws::handler::{device_ws_handler, operator_ws_handler};

/// Builds the full application: REST API, device endpoint at `/hub`,
/// operator stream at `/ws`, tracing and CORS.
///
/// An empty `cors_origins` list yields a permissive CORS policy.
pub fn build_app(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/hub", get(device_ws_handler))
        .route("/ws", get(operator_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Serves `app` on `listener` until `shutdown` resolves.
///
/// Peer addresses are made available to handlers through `ConnectInfo`.
///
/// # Errors
///
/// Returns the underlying I/O error if the server fails.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
