//! Credential checks for devices and operators.
//!
//! Devices present a provisioned token in their `hub_connect` frame;
//! operators present a bearer token on REST and WebSocket requests.

pub mod device;
pub mod operator;

pub use device::{DeviceAuthenticator, StaticDeviceTokens};
pub use operator::{OperatorAuth, OperatorGate, StaticOperatorTokens};

/// A device token that is unknown or does not belong to the claimed hub.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device token")]
pub struct InvalidToken;

/// A token table entry that is not of the form `token=value`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed token entry {0:?}: expected `token=hub_id`")]
pub struct MalformedTokenEntry(pub String);
