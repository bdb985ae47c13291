//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::auth::{OperatorGate, StaticDeviceTokens};
use crate::config::GatewayConfig;
use crate::domain::EventBus;
use crate::persistence::{CommandLogStore, MemoryStore, TelemetryStore};
use crate::service::HubService;
use crate::ws::DeviceLinkSettings;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Hub service for all business logic.
    pub hub_service: Arc<HubService>,
    /// Event bus for operator streams.
    pub event_bus: EventBus,
    /// Operator token check used by [`OperatorAuth`](crate::auth::OperatorAuth).
    pub operator_gate: Arc<dyn OperatorGate>,
    /// Device connection timing.
    pub device_link: DeviceLinkSettings,
}

impl AppState {
    /// Wires the in-memory stores, the service and the gates from `config`.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        let store = Arc::new(MemoryStore::new(config.retention));
        let event_bus = EventBus::new(config.event_bus_capacity);
        let devices: Arc<StaticDeviceTokens> = Arc::new(config.device_tokens.clone());
        let hub_service = HubService::new(
            devices,
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            store as Arc<dyn CommandLogStore>,
            event_bus.clone(),
            config.command_timeouts,
        );

        Self {
            hub_service: Arc::new(hub_service),
            event_bus,
            operator_gate: Arc::new(config.operator_tokens.clone()),
            device_link: DeviceLinkSettings {
                handshake_timeout: config.handshake_timeout,
                heartbeat_timeout: config.heartbeat_timeout,
                outbound_queue_capacity: config.outbound_queue_capacity,
            },
        }
    }
}
