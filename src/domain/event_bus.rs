//! Fan-out of hub events to operator streams.
//!
//! Every session transition, telemetry record, health snapshot and command
//! resolution is published once here. Each operator WebSocket holds its
//! own receiver and applies its subscription filter on the way out, so
//! publishing never depends on who is listening.

use tokio::sync::broadcast;

use super::HubEvent;

/// Publisher side of the operator event stream.
///
/// The ring buffer holds `capacity` events. An operator stream that falls
/// further behind skips to the oldest retained event and sees
/// [`broadcast::error::RecvError::Lagged`] with the number it missed;
/// device sessions and dispatch are never slowed down by a slow reader.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HubEvent>,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` undelivered events (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event` and returns how many operator streams will see it.
    /// Zero means nobody is listening and the event is gone.
    pub fn publish(&self, event: HubEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Opens a receiver for one operator stream. It only sees events
    /// published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }

    /// Number of operator streams currently attached.
    #[must_use]
    pub fn operator_streams(&self) -> usize {
        self.sender.receiver_count()
    }
}
