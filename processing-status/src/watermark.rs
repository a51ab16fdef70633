//! Cluster-wide post-indexing watermark.
//!
//! The watermark is the earliest post-indexing receive time among the active nodes (see
//! [SelectionPredicate]). Every message received before it has been indexed on every node that
//! counts, so a search over a range ending at the watermark is not missing data. The slowest
//! active node bounds it. When no node is active there is no watermark, which callers must treat
//! as "safety cannot be asserted" and never as "now" or the epoch.

use crate::error::Result;
use crate::model::StatusRecord;
use crate::selection::SelectionPredicate;
use crate::status_store::StatusStore;
use crate::store::DocumentStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::debug;

/// Minimum post-indexing time of the records `predicate` selects. Ties resolve to the shared
/// value, node identity plays no part.
pub fn earliest_post_indexing(
    records: &[StatusRecord],
    predicate: &SelectionPredicate,
) -> Option<DateTime<Utc>> {
    records
        .iter()
        .filter(|record| predicate.matches(record))
        .map(|record| record.receive_times().post_indexing)
        .min()
}

/// Computes the watermark from the records persisted in a [StatusStore]. Holds no state between
/// calls and never writes.
pub struct WatermarkCalculator<S> {
    status_store: Arc<StatusStore<S>>,
    update_threshold: TimeDelta,
    journal_write_rate_threshold: f64,
}

impl<S: DocumentStore> WatermarkCalculator<S> {
    pub fn new(
        status_store: Arc<StatusStore<S>>,
        update_threshold: TimeDelta,
        journal_write_rate_threshold: f64,
    ) -> Self {
        Self {
            status_store,
            update_threshold,
            journal_write_rate_threshold,
        }
    }

    /// Watermark as of the status store's clock, using the configured thresholds.
    pub async fn earliest_post_indexing_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let now = self.status_store.clock().now_utc();
        self.earliest_post_indexing_timestamp_at(
            now,
            self.update_threshold,
            self.journal_write_rate_threshold,
        )
        .await
    }

    /// Watermark over the records updated within `threshold` of `now` whose journal write rate
    /// is at least `journal_write_rate_cutoff`. The selection runs in the store.
    pub async fn earliest_post_indexing_timestamp_at(
        &self,
        now: DateTime<Utc>,
        threshold: TimeDelta,
        journal_write_rate_cutoff: f64,
    ) -> Result<Option<DateTime<Utc>>> {
        let predicate = SelectionPredicate::new(now, threshold, journal_write_rate_cutoff);
        let active = self.status_store.find_active(&predicate).await?;

        let watermark = active
            .iter()
            .map(|record| record.receive_times().post_indexing)
            .min();

        debug!(
            active_nodes = active.len(),
            watermark = ?watermark,
            updated_since = %predicate.updated_since(),
            "Computed earliest post-indexing timestamp"
        );
        Ok(watermark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::clock::{Clock, ManualClock};
    use crate::model::{JournalInfo, Lifecycle, ReceiveTimes};
    use crate::status_store::tests::{seeded_store, status_store, ts};
    use crate::store::in_memory::InMemoryDocumentStore;

    fn calculator(
        store: InMemoryDocumentStore,
        clock: &ManualClock,
        threshold: TimeDelta,
    ) -> WatermarkCalculator<InMemoryDocumentStore> {
        WatermarkCalculator::new(Arc::new(status_store(store, clock)), threshold, 1.0)
    }

    fn record(node_id: &str, updated_at: &str, post_indexing: &str, rate: f64) -> StatusRecord {
        StatusRecord::new(
            node_id,
            Lifecycle::Running,
            ts(updated_at),
            ReceiveTimes {
                ingest: ts(updated_at),
                post_processing: ts(updated_at),
                post_indexing: ts(post_indexing),
            },
            JournalInfo {
                uncommitted_entries: 0,
                read_messages_1m_rate: rate,
                written_messages_1m_rate: rate,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_earliest_post_indexing_timestamp() {
        let clock = ManualClock::new(ts("2019-01-01T02:01:00.000Z"));

        // the threshold includes all nodes, abc-123 has the earliest indexed timestamp
        let wide = calculator(seeded_store(), &clock, TimeDelta::hours(4));
        assert_eq!(
            wide.earliest_post_indexing_timestamp().await.unwrap(),
            Some(ts("2019-01-01T00:01:00.000Z"))
        );

        // only abc-456 and abc-789 are recent enough, abc-789 has the earliest indexed timestamp
        let narrow = calculator(seeded_store(), &clock, TimeDelta::hours(2));
        assert_eq!(
            narrow.earliest_post_indexing_timestamp().await.unwrap(),
            Some(ts("2019-01-01T01:01:00.000Z"))
        );
    }

    #[tokio::test]
    async fn test_without_any_recent_updates() {
        let clock = ManualClock::new(ts("2019-01-02T00:00:00.000Z"));
        let calculator = calculator(seeded_store(), &clock, TimeDelta::minutes(1));
        assert_eq!(
            calculator.earliest_post_indexing_timestamp().await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_without_data() {
        let clock = ManualClock::new(ts("2019-01-01T00:00:00.000Z"));
        let calculator = calculator(
            InMemoryDocumentStore::new("processing_status"),
            &clock,
            TimeDelta::minutes(1),
        );
        assert_eq!(
            calculator.earliest_post_indexing_timestamp().await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_idempotent_reads() {
        let store = seeded_store();
        let clock = ManualClock::new(ts("2019-01-01T02:01:00.000Z"));
        let calculator = calculator(store.clone(), &clock, TimeDelta::hours(4));

        let first = calculator.earliest_post_indexing_timestamp().await.unwrap();
        let second = calculator.earliest_post_indexing_timestamp().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_store_unavailable_is_not_empty() {
        let store = seeded_store();
        let clock = ManualClock::new(ts("2019-01-01T02:01:00.000Z"));
        let calculator = calculator(store.clone(), &clock, TimeDelta::hours(4));

        store.fail_reads(1);
        assert!(matches!(
            calculator.earliest_post_indexing_timestamp().await,
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_explicit_arguments_override_configuration() {
        let clock = ManualClock::new(ts("2019-01-01T00:00:00.000Z"));
        let calculator = calculator(seeded_store(), &clock, TimeDelta::minutes(1));

        let watermark = calculator
            .earliest_post_indexing_timestamp_at(
                ts("2019-01-01T02:01:00.000Z"),
                TimeDelta::hours(2),
                5.0,
            )
            .await
            .unwrap();
        // abc-789 writes 4.0 messages per minute, below the cutoff, and abc-456 nothing at all
        assert_eq!(watermark, None);
        assert_eq!(clock.now_utc(), ts("2019-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_unselected_nodes_cannot_lower_the_watermark() {
        let now = ts("2019-01-01T02:00:00Z");
        let predicate = SelectionPredicate::new(now, TimeDelta::hours(1), 1.0);
        let records = vec![
            record("fresh-a", "2019-01-01T01:59:00Z", "2019-01-01T01:30:00Z", 5.0),
            record("fresh-b", "2019-01-01T01:58:00Z", "2019-01-01T01:45:00Z", 5.0),
            // stale
            record("stale", "2019-01-01T00:30:00Z", "2019-01-01T00:00:00Z", 5.0),
            // idle
            record("idle", "2019-01-01T01:59:00Z", "2019-01-01T00:10:00Z", 0.5),
        ];

        let watermark = earliest_post_indexing(&records, &predicate).unwrap();
        assert_eq!(watermark, ts("2019-01-01T01:30:00Z"));

        for record in records.iter().filter(|r| predicate.matches(r)) {
            assert!(watermark <= record.receive_times().post_indexing);
        }
    }

    #[test]
    fn test_ties_resolve_to_shared_value() {
        let now = ts("2019-01-01T02:00:00Z");
        let predicate = SelectionPredicate::new(now, TimeDelta::hours(1), 1.0);
        let records = vec![
            record("a", "2019-01-01T01:59:00Z", "2019-01-01T01:30:00Z", 5.0),
            record("b", "2019-01-01T01:58:00Z", "2019-01-01T01:30:00Z", 5.0),
            record("c", "2019-01-01T01:57:00Z", "2019-01-01T01:50:00Z", 5.0),
        ];
        assert_eq!(
            earliest_post_indexing(&records, &predicate),
            Some(ts("2019-01-01T01:30:00Z"))
        );
        assert_eq!(earliest_post_indexing(&[], &predicate), None);
    }
}
