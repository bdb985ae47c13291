//! Device-facing duplex endpoint.
//!
//! Each hub holds one WebSocket open for its whole session. The first
//! frame must be a `hub_connect` handshake; afterwards a single loop
//! multiplexes inbound frames, the session's outbound queue, the session
//! state (eviction, shutdown) and the heartbeat deadline.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::SplitSink;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::domain::{CloseReason, Session};
use crate::protocol::{FrameError, Handshake, InboundFrame, ServerFrame, classify, decode_handshake};
use crate::service::HubService;

/// Timing and buffering knobs for device connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLinkSettings {
    /// Time allowed for the `hub_connect` frame.
    pub handshake_timeout: Duration,
    /// Inbound silence after which the session is closed.
    pub heartbeat_timeout: Duration,
    /// Capacity of the per-session outbound queue.
    pub outbound_queue_capacity: usize,
}

impl Default for DeviceLinkSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(90),
            outbound_queue_capacity: 64,
        }
    }
}

type WsSink = SplitSink<WebSocket, Message>;

/// Runs a device connection from handshake to teardown.
pub async fn run_device_connection(
    socket: WebSocket,
    hub_service: Arc<HubService>,
    settings: DeviceLinkSettings,
    remote_addr: Option<String>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let handshake = match tokio::time::timeout(settings.handshake_timeout, ws_rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            decode_handshake(&text).map_err(|e| format!("malformed handshake: {e}"))
        }
        Ok(Some(Ok(_))) => Err("first frame must be a hub_connect text frame".to_string()),
        Ok(Some(Err(_)) | None) => {
            tracing::debug!(?remote_addr, "device left before handshake");
            return;
        }
        Err(_) => Err("handshake timed out".to_string()),
    };
    let handshake: Handshake = match handshake {
        Ok(handshake) => handshake,
        Err(reason) => {
            tracing::warn!(?remote_addr, %reason, "rejecting device connection");
            close_with(&mut ws_tx, close_code::POLICY, reason).await;
            return;
        }
    };

    let (out_tx, mut out_rx) = mpsc::channel(settings.outbound_queue_capacity);
    let claimed = handshake.hub_id.clone();
    let session = match hub_service
        .open_session(handshake, remote_addr.clone(), out_tx)
        .await
    {
        Ok(session) => session,
        Err(error) => {
            tracing::warn!(hub_id = %claimed, ?remote_addr, %error, "rejecting device connection");
            close_with(&mut ws_tx, close_code::POLICY, error.to_string()).await;
            return;
        }
    };

    // The ack goes out before the loop starts draining the queue, so it
    // always precedes the first command frame.
    let ack = ServerFrame::hub_connected(session.hub_id().clone(), session.id()).encode();
    let acked = match ack {
        Ok(text) => ws_tx.send(Message::text(text)).await.is_ok(),
        Err(error) => {
            tracing::error!(hub_id = %session.hub_id(), %error, "failed to encode ack");
            false
        }
    };
    let reason = if acked {
        session_loop(&mut ws_tx, &mut ws_rx, &mut out_rx, &session, &hub_service, settings).await
    } else {
        CloseReason::RemoteDisconnect
    };

    hub_service.close_session(&session, reason).await;
    let code = match reason {
        CloseReason::Shutdown => close_code::AWAY,
        CloseReason::HeartbeatTimeout | CloseReason::Evicted => close_code::POLICY,
        CloseReason::RemoteDisconnect | CloseReason::Rejected => close_code::NORMAL,
    };
    close_with(&mut ws_tx, code, reason.as_str().to_string()).await;
}

async fn session_loop(
    ws_tx: &mut WsSink,
    ws_rx: &mut futures_util::stream::SplitStream<WebSocket>,
    out_rx: &mut mpsc::Receiver<String>,
    session: &Arc<Session>,
    hub_service: &HubService,
    settings: DeviceLinkSettings,
) -> CloseReason {
    let mut state_rx = session.watch_state();
    let heartbeat = tokio::time::sleep(settings.heartbeat_timeout);
    tokio::pin!(heartbeat);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let frame = match msg {
                    Some(Ok(Message::Text(text))) => classify(&text),
                    Some(Ok(Message::Binary(_))) => InboundFrame::Malformed(FrameError::Binary),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        heartbeat.as_mut().reset(Instant::now() + settings.heartbeat_timeout);
                        session.touch();
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => return CloseReason::RemoteDisconnect,
                    Some(Err(error)) => {
                        tracing::debug!(hub_id = %session.hub_id(), %error, "device socket error");
                        return CloseReason::RemoteDisconnect;
                    }
                };
                heartbeat.as_mut().reset(Instant::now() + settings.heartbeat_timeout);
                tracing::trace!(hub_id = %session.hub_id(), kind = frame.kind(), "inbound frame");
                hub_service.handle_frame(session, frame).await;
            }
            outbound = out_rx.recv() => {
                let Some(text) = outbound else {
                    return CloseReason::RemoteDisconnect;
                };
                if ws_tx.send(Message::text(text)).await.is_err() {
                    return CloseReason::RemoteDisconnect;
                }
            }
            _ = state_rx.wait_for(|state| state.is_closing()).map(|r| r.is_ok()) => {
                return session.close_reason().unwrap_or(CloseReason::Shutdown);
            }
            () = &mut heartbeat => {
                tracing::warn!(
                    hub_id = %session.hub_id(),
                    timeout_secs = settings.heartbeat_timeout.as_secs(),
                    "heartbeat timeout"
                );
                return CloseReason::HeartbeatTimeout;
            }
        }
    }
}

async fn close_with(ws_tx: &mut WsSink, code: u16, reason: String) {
    // Close reasons are limited to 123 bytes on the wire.
    let reason: String = reason.chars().take(120).collect();
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = ws_tx.send(Message::Close(Some(frame))).await;
}
