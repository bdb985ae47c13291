//! Device-token authentication.

use std::collections::HashMap;
use std::fmt::Debug;

use super::{InvalidToken, MalformedTokenEntry};
use crate::domain::HubId;

/// Resolves a device token to the hub it was provisioned for.
pub trait DeviceAuthenticator: Send + Sync + Debug {
    /// Returns the hub bound to `token`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidToken`] if the token is unknown.
    fn authenticate(&self, token: &str) -> Result<HubId, InvalidToken>;
}

/// Fixed token → hub table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceTokens {
    tokens: HashMap<String, HubId>,
}

impl StaticDeviceTokens {
    /// Builds a table from `(token, hub)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (String, HubId)>) -> Self {
        Self {
            tokens: entries.into_iter().collect(),
        }
    }

    /// Parses a comma-separated `token=hub_id` list. Blank entries are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedTokenEntry`] for an entry without `=`, with an
    /// empty token, or with an empty hub id.
    pub fn parse(table: &str) -> Result<Self, MalformedTokenEntry> {
        let mut tokens = HashMap::new();
        for entry in table.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let malformed = || MalformedTokenEntry(entry.to_string());
            let (token, hub) = entry.split_once('=').ok_or_else(malformed)?;
            let token = token.trim();
            if token.is_empty() {
                return Err(malformed());
            }
            let hub_id = HubId::new(hub).map_err(|_| malformed())?;
            tokens.insert(token.to_string(), hub_id);
        }
        Ok(Self { tokens })
    }

    /// Returns the number of provisioned tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no device can authenticate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl DeviceAuthenticator for StaticDeviceTokens {
    fn authenticate(&self, token: &str) -> Result<HubId, InvalidToken> {
        self.tokens.get(token).cloned().ok_or(InvalidToken)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_table_and_authenticates() {
        let Ok(table) = StaticDeviceTokens::parse(
            "dev-token-rpi-bridge-01=rpi-bridge-01, dev-token-rpi-bridge-02=rpi-bridge-02,",
        ) else {
            panic!("table should parse");
        };
        assert_eq!(table.len(), 2);

        let Ok(hub) = table.authenticate("dev-token-rpi-bridge-02") else {
            panic!("token should be known");
        };
        assert_eq!(hub.as_str(), "rpi-bridge-02");
        assert_eq!(table.authenticate("nope"), Err(InvalidToken));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(StaticDeviceTokens::parse("no-separator").is_err());
        assert!(StaticDeviceTokens::parse("=hub").is_err());
        assert!(StaticDeviceTokens::parse("tok=  ").is_err());
    }

    #[test]
    fn empty_table_rejects_everything() {
        let Ok(table) = StaticDeviceTokens::parse("") else {
            panic!("empty table should parse");
        };
        assert!(table.is_empty());
        assert!(table.authenticate("").is_err());
    }
}
