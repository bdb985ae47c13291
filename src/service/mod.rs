//! Service layer: business logic orchestration.
//!
//! [`HubService`] owns the session lifecycle, routes inbound device frames
//! to the correlator and telemetry sink, and exposes the command dispatch
//! API used by the REST handlers.

pub mod hub_service;

pub use hub_service::{HubDetail, HubService};
