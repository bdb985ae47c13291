//! WebSocket layer: device sessions and operator event streams.
//!
//! Hubs connect at `/hub` and keep one long-lived socket per session.
//! Operators connect at `/ws` to receive filtered [`HubEvent`]s.
//!
//! [`HubEvent`]: crate::domain::HubEvent

pub mod device;
pub mod handler;
pub mod messages;
pub mod operator;
pub mod subscription;

pub use device::DeviceLinkSettings;
