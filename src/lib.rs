//! # hub-gateway
//!
//! Cloud gateway for IoT hubs. Each hub keeps one WebSocket session open;
//! operators issue serial writes, firmware flashes and restarts over REST
//! and the gateway correlates each command with the hub's asynchronous
//! response, under a timeout.
//!
//! ## Architecture
//!
//! ```text
//! Hubs (WebSocket /hub)          Operators (REST /api/v1, WebSocket /ws)
//!     │                                  │
//!     ├── Device link (ws/)              ├── REST Handlers (api/)
//!     │                                  ├── Operator stream (ws/)
//!     └──────────────┬───────────────────┘
//!                    │
//!              HubService (service/)
//!                    │
//!     ├── HubRegistry      (domain/)  one active session per hub
//!     ├── CommandCorrelator (domain/) pending commands and deadlines
//!     ├── TelemetrySink    (domain/)  sequencing and fan-out
//!     ├── EventBus         (domain/)
//!     │
//!     └── In-memory telemetry store and command log (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod service;
pub mod ws;
