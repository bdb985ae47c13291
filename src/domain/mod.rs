//! Domain layer: hub sessions, command correlation and telemetry.
//!
//! This module contains the server-side domain model: hub identity, the
//! per-connection session state machine and its port table, the registry enforcing one live
//! session per hub, the command correlator, the telemetry sink, and the
//! event bus broadcasting hub activity to operator streams.

pub mod command;
pub mod correlator;
pub mod event_bus;
pub mod hub_event;
pub mod hub_id;
pub mod hub_registry;
pub mod port;
pub mod session;
pub mod telemetry_sink;

pub use command::{CommandFailure, CommandId, CommandKind, CommandRequest, CommandResult};
pub use correlator::CommandCorrelator;
pub use event_bus::EventBus;
pub use hub_event::HubEvent;
pub use hub_id::HubId;
pub use hub_registry::HubRegistry;
pub use port::{PortEvent, PortEventKind, PortInfo};
pub use session::{CloseReason, Session, SessionState};
pub use telemetry_sink::TelemetrySink;
