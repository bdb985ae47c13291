//! Type-safe hub identifier.
//!
//! [`HubId`] is a newtype wrapper around the provisioning string a device
//! presents in its handshake. The gateway never generates these; it only
//! validates that they are non-empty and uses them as registry keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a hub identifier is empty or whitespace only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("hub identifier must not be empty")]
pub struct EmptyHubId;

/// Unique identifier of a physical hub device.
///
/// Assigned out-of-band at provisioning time. Used as the key in
/// [`super::HubRegistry`], as the partition key of the telemetry store and
/// as the WebSocket subscription target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HubId(String);

impl HubId {
    /// Creates a `HubId`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyHubId`] if the trimmed identifier is empty.
    pub fn new(raw: impl Into<String>) -> Result<Self, EmptyHubId> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmptyHubId);
        }
        if trimmed.len() == raw.len() {
            Ok(Self(raw))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HubId {
    type Err = EmptyHubId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for HubId {
    type Error = EmptyHubId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HubId> for String {
    fn from(id: HubId) -> Self {
        id.0
    }
}

impl AsRef<str> for HubId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_blank() {
        assert_eq!(HubId::new(""), Err(EmptyHubId));
        assert_eq!(HubId::new("   "), Err(EmptyHubId));
    }

    #[test]
    fn trims_whitespace() {
        let Ok(id) = HubId::new("  rpi-bridge-01 ") else {
            panic!("valid hub id");
        };
        assert_eq!(id.as_str(), "rpi-bridge-01");
    }

    #[test]
    fn display_matches_raw() {
        let Ok(id) = "rpi-bridge-02".parse::<HubId>() else {
            panic!("valid hub id");
        };
        assert_eq!(format!("{id}"), "rpi-bridge-02");
    }

    #[test]
    fn deserialize_rejects_empty() {
        let result = serde_json::from_str::<HubId>("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let Ok(id) = HubId::new("hub-a") else {
            panic!("valid hub id");
        };
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"hub-a\"");
    }

    #[test]
    fn ordering_is_lexicographic() {
        let (Ok(a), Ok(b)) = (HubId::new("a"), HubId::new("b")) else {
            panic!("valid hub ids");
        };
        assert!(a < b);
    }
}
