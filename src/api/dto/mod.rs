//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names are camelCase on the wire.

pub mod command_dto;
pub mod hub_dto;
pub mod telemetry_dto;

pub use command_dto::*;
pub use hub_dto::*;
pub use telemetry_dto::*;
