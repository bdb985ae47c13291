//! In-process implementation of the telemetry store and command log.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};

use super::models::{
    CommandLogEntry, RetentionPolicy, TelemetryQuery, TelemetryRecord, TelemetryStats,
};
use super::{CommandLogStore, CommandUpdate, TelemetryStore};
use crate::domain::HubId;
use crate::domain::command::CommandId;

#[derive(Debug, Default)]
struct CommandLog {
    entries: HashMap<CommandId, CommandLogEntry>,
    by_hub: HashMap<HubId, VecDeque<CommandId>>,
}

/// Bounded in-memory store.
///
/// Telemetry is kept in a per-hub ring with FIFO eviction once
/// [`RetentionPolicy::max_records_per_hub`] is reached; records older than
/// [`RetentionPolicy::max_age`] are dropped on append and hidden from
/// queries.
#[derive(Debug)]
pub struct MemoryStore {
    policy: RetentionPolicy,
    max_age: Option<TimeDelta>,
    telemetry: RwLock<HashMap<HubId, VecDeque<TelemetryRecord>>>,
    commands: RwLock<CommandLog>,
}

impl MemoryStore {
    /// Creates an empty store with the given retention policy.
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            max_age: policy.max_age.and_then(|age| TimeDelta::from_std(age).ok()),
            telemetry: RwLock::new(HashMap::new()),
            commands: RwLock::new(CommandLog::default()),
        }
    }

    /// Returns the retention policy in force.
    #[must_use]
    pub const fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.max_age.and_then(|age| now.checked_sub_signed(age))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl TelemetryStore for MemoryStore {
    fn append(&self, record: TelemetryRecord) {
        let cutoff = self.cutoff(record.timestamp);
        let mut map = self
            .telemetry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let ring = map.entry(record.hub_id.clone()).or_default();
        ring.push_back(record);

        while ring.len() > self.policy.max_records_per_hub {
            ring.pop_front();
        }
        if let Some(cutoff) = cutoff {
            while ring.front().is_some_and(|oldest| oldest.timestamp < cutoff) {
                ring.pop_front();
            }
        }
    }

    fn query(&self, hub_id: &HubId, query: &TelemetryQuery) -> Vec<TelemetryRecord> {
        let cutoff = self.cutoff(Utc::now());
        let map = self.telemetry.read().unwrap_or_else(PoisonError::into_inner);
        let Some(ring) = map.get(hub_id) else {
            return Vec::new();
        };

        let mut newest: Vec<TelemetryRecord> = ring
            .iter()
            .rev()
            .filter(|r| cutoff.is_none_or(|c| r.timestamp >= c))
            .filter(|r| query.since.is_none_or(|since| r.timestamp >= since))
            .take(query.limit)
            .cloned()
            .collect();
        newest.reverse();
        newest
    }

    fn stats(&self, hub_id: &HubId) -> TelemetryStats {
        let cutoff = self.cutoff(Utc::now());
        let map = self.telemetry.read().unwrap_or_else(PoisonError::into_inner);
        map.get(hub_id)
            .map(|ring| {
                ring.iter()
                    .filter(|r| cutoff.is_none_or(|c| r.timestamp >= c))
                    .fold(TelemetryStats::default(), |acc, r| TelemetryStats {
                        count: acc.count + 1,
                        total_bytes: acc.total_bytes + r.data_size_bytes as u64,
                    })
            })
            .unwrap_or_default()
    }
}

impl CommandLogStore for MemoryStore {
    fn log_issued(&self, entry: CommandLogEntry) {
        let mut log = self.commands.write().unwrap_or_else(PoisonError::into_inner);
        let CommandLog { entries, by_hub } = &mut *log;

        let order = by_hub.entry(entry.hub_id.clone()).or_default();
        order.push_back(entry.command_id);
        while order.len() > self.policy.max_commands_per_hub {
            if let Some(evicted) = order.pop_front() {
                entries.remove(&evicted);
            }
        }
        entries.insert(entry.command_id, entry);
    }

    fn log_update(&self, command_id: &CommandId, update: CommandUpdate) -> bool {
        let mut log = self.commands.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = log.entries.get_mut(command_id) else {
            return false;
        };
        if entry.status.is_terminal() {
            return false;
        }
        entry.status = update.status;
        if update.progress.is_some() {
            entry.progress = update.progress;
        }
        if update.result.is_some() {
            entry.result = update.result;
        }
        entry.error = update.error;
        entry.updated_at = update.at;
        true
    }

    fn command(&self, command_id: &CommandId) -> Option<CommandLogEntry> {
        let log = self.commands.read().unwrap_or_else(PoisonError::into_inner);
        log.entries.get(command_id).cloned()
    }

    fn commands(&self, hub_id: &HubId, limit: usize) -> Vec<CommandLogEntry> {
        let log = self.commands.read().unwrap_or_else(PoisonError::into_inner);
        log.by_hub
            .get(hub_id)
            .map(|order| {
                order
                    .iter()
                    .rev()
                    .filter_map(|id| log.entries.get(id))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
