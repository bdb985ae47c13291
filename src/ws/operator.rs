//! Operator event stream.
//!
//! Handles the read/write loop for a single operator WebSocket: answers
//! subscription commands and forwards hub events that pass the
//! connection's filter.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{HubEvent, HubId};
use crate::service::HubService;

/// Runs the read/write loop for a single operator connection.
///
/// - Reads commands from the client and answers them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_operator_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<HubEvent>,
    hub_service: Arc<HubService>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();
    let mut shutdown = hub_service.shutdown_signal();

    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stopping| *stopping).map(|r| r.is_ok()) => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &hub_service).await;
                        if let Some(json) = response
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(hub_event) => {
                        if !subs.matches(hub_event.hub_id()) {
                            continue;
                        }
                        let Ok(payload) = serde_json::to_value(&hub_event) else {
                            continue;
                        };
                        let msg = WsMessage::new(uuid::Uuid::new_v4().to_string(), WsMessageType::Event, payload);
                        if let Some(json) = msg.to_json()
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "operator stream lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("operator connection closed");
}

/// Handles a text message from the client, returning an optional JSON response.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    hub_service: &HubService,
) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error("", 400, "malformed JSON").to_json();
    };
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command").to_json();
    };

    let payload = match command {
        WsCommand::Subscribe { hub_ids } => {
            let (ids, wildcard) = parse_hub_ids(&hub_ids);
            subs.subscribe(&ids, wildcard);
            serde_json::json!({
                "subscribed": ids,
                "count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::Unsubscribe { hub_ids } => {
            let (ids, wildcard) = parse_hub_ids(&hub_ids);
            subs.unsubscribe(&ids, wildcard);
            serde_json::json!({
                "unsubscribed": ids,
                "remaining_count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::ListHubs => {
            let hubs = hub_service.list_hubs().await;
            serde_json::json!({ "count": hubs.len(), "hubs": hubs })
        }
    };
    WsMessage::new(msg.id, WsMessageType::Response, payload).to_json()
}

/// Splits raw ids into valid hub ids and the wildcard flag.
fn parse_hub_ids(raw: &[String]) -> (Vec<HubId>, bool) {
    let wildcard = raw.iter().any(|id| id == "*");
    let ids = raw
        .iter()
        .filter(|id| *id != "*")
        .filter_map(|id| HubId::new(id.as_str()).ok())
        .collect();
    (ids, wildcard)
}
