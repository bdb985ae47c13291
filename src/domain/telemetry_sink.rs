//! Ingestion point for unsolicited device telemetry.
//!
//! [`TelemetrySink`] stamps each sample with a server time and a
//! process-wide sequence, hands it to the configured
//! [`TelemetryStore`](crate::persistence::TelemetryStore) and announces it
//! on the [`EventBus`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use super::{EventBus, HubEvent, HubId};
use crate::persistence::TelemetryStore;
use crate::persistence::models::{TelemetryQuery, TelemetryRecord, TelemetrySample, TelemetryStats};

/// Append-only telemetry recorder backed by a [`TelemetryStore`].
#[derive(Debug)]
pub struct TelemetrySink {
    store: Arc<dyn TelemetryStore>,
    events: EventBus,
    next_sequence: AtomicU64,
}

impl TelemetrySink {
    /// Creates a sink writing to `store` and publishing to `events`.
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryStore>, events: EventBus) -> Self {
        Self {
            store,
            events,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Stores `sample` for `hub_id` and returns the stamped record.
    pub fn record(&self, hub_id: &HubId, sample: TelemetrySample) -> TelemetryRecord {
        let record = TelemetryRecord {
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            hub_id: hub_id.clone(),
            timestamp: Utc::now(),
            port_id: sample.port_id,
            session_id: sample.session_id,
            data: sample.data,
            data_size_bytes: sample.data_size_bytes,
        };
        self.store.append(record.clone());

        self.events.publish(HubEvent::Telemetry {
            hub_id: record.hub_id.clone(),
            sequence: record.sequence,
            port_id: record.port_id.clone(),
            session_id: record.session_id.clone(),
            data: record.data.clone(),
            data_size_bytes: record.data_size_bytes,
            timestamp: record.timestamp,
        });
        record
    }

    /// Returns stored records for `hub_id`, oldest first.
    #[must_use]
    pub fn query(&self, hub_id: &HubId, query: &TelemetryQuery) -> Vec<TelemetryRecord> {
        self.store.query(hub_id, query)
    }

    /// Returns count and byte totals for `hub_id`.
    #[must_use]
    pub fn stats(&self, hub_id: &HubId) -> TelemetryStats {
        self.store.stats(hub_id)
    }
}
