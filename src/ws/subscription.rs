//! Per-connection subscription manager.
//!
//! Tracks which hubs an operator stream is subscribed to and provides
//! server-side event filtering.

use std::collections::HashSet;

use crate::domain::HubId;

/// Manages the set of hub subscriptions for a single operator connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed hub IDs. Ignored while `subscribe_all` is set.
    hub_ids: HashSet<HubId>,
    /// Whether the client subscribes to all hubs (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds hub IDs to the subscription set; `wildcard` enables `"*"`.
    pub fn subscribe(&mut self, ids: &[HubId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.hub_ids.extend(ids.iter().cloned());
    }

    /// Removes hub IDs from the subscription set; `wildcard` clears `"*"`.
    pub fn unsubscribe(&mut self, ids: &[HubId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for id in ids {
            self.hub_ids.remove(id);
        }
    }

    /// Returns `true` if events of `hub_id` pass the filter.
    #[must_use]
    pub fn matches(&self, hub_id: &HubId) -> bool {
        self.subscribe_all || self.hub_ids.contains(hub_id)
    }

    /// Returns the number of explicitly subscribed hubs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.hub_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub const fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn hub(name: &str) -> HubId {
        let Ok(id) = HubId::new(name) else {
            panic!("valid hub id");
        };
        id
    }

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&hub("H1")));
    }

    #[test]
    fn subscribe_specific_hub() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[hub("H1")], false);
        assert!(mgr.matches(&hub("H1")));
        assert!(!mgr.matches(&hub("H2")));
        assert_eq!(mgr.count(), 1);
    }

    #[test]
    fn wildcard_matches_everything_until_cleared() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true);
        assert!(mgr.matches(&hub("anything")));
        mgr.unsubscribe(&[], true);
        assert!(!mgr.is_subscribed_all());
        assert!(!mgr.matches(&hub("anything")));
    }

    #[test]
    fn unsubscribe_removes_hub() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[hub("H1"), hub("H2")], false);
        mgr.unsubscribe(&[hub("H1")], false);
        assert!(!mgr.matches(&hub("H1")));
        assert!(mgr.matches(&hub("H2")));
    }
}
