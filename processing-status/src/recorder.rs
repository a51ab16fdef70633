//! Live per-node processing counters. The pipeline updates a [StatusRecorder] as messages move
//! through it and the status store reads a [RecorderSnapshot] from it whenever the node publishes.

use crate::model::Lifecycle;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Point-in-time copy of the recorder counters.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSnapshot {
    pub lifecycle: Lifecycle,
    pub ingest_receive_time: DateTime<Utc>,
    pub post_processing_receive_time: DateTime<Utc>,
    pub post_indexing_receive_time: DateTime<Utc>,
    pub uncommitted_entries: u64,
    pub read_messages_1m_rate: f64,
    pub written_messages_1m_rate: f64,
}

/// Source of the counters a node publishes.
pub trait StatusRecorder: Send + Sync {
    fn snapshot(&self) -> RecorderSnapshot;
}

impl StatusRecorder for RecorderSnapshot {
    fn snapshot(&self) -> RecorderSnapshot {
        self.clone()
    }
}

/// Lock-free recorder kept in process memory. Receive times only ever move forward, so a late
/// update carrying an older timestamp is ignored. Timestamps are kept at millisecond precision.
#[derive(Debug)]
pub struct InMemoryStatusRecorder {
    lifecycle: RwLock<Lifecycle>,
    ingest_receive_time: AtomicI64,
    post_processing_receive_time: AtomicI64,
    post_indexing_receive_time: AtomicI64,
    uncommitted_entries: AtomicU64,
    /// f64 bits
    read_messages_1m_rate: AtomicU64,
    /// f64 bits
    written_messages_1m_rate: AtomicU64,
}

impl Default for InMemoryStatusRecorder {
    fn default() -> Self {
        Self {
            lifecycle: RwLock::new(Lifecycle::Running),
            ingest_receive_time: AtomicI64::new(0),
            post_processing_receive_time: AtomicI64::new(0),
            post_indexing_receive_time: AtomicI64::new(0),
            uncommitted_entries: AtomicU64::new(0),
            read_messages_1m_rate: AtomicU64::new(0f64.to_bits()),
            written_messages_1m_rate: AtomicU64::new(0f64.to_bits()),
        }
    }
}

impl InMemoryStatusRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *self.lifecycle.write() = lifecycle;
    }

    pub fn update_ingest_receive_time(&self, timestamp: DateTime<Utc>) {
        self.ingest_receive_time
            .fetch_max(timestamp.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn update_post_processing_receive_time(&self, timestamp: DateTime<Utc>) {
        self.post_processing_receive_time
            .fetch_max(timestamp.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn update_post_indexing_receive_time(&self, timestamp: DateTime<Utc>) {
        self.post_indexing_receive_time
            .fetch_max(timestamp.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn set_uncommitted_entries(&self, entries: u64) {
        self.uncommitted_entries.store(entries, Ordering::Relaxed);
    }

    /// Negative or non-finite rates are recorded as zero.
    pub fn set_read_messages_1m_rate(&self, rate: f64) {
        self.read_messages_1m_rate
            .store(sanitize_rate(rate).to_bits(), Ordering::Relaxed);
    }

    /// Negative or non-finite rates are recorded as zero.
    pub fn set_written_messages_1m_rate(&self, rate: f64) {
        self.written_messages_1m_rate
            .store(sanitize_rate(rate).to_bits(), Ordering::Relaxed);
    }
}

fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        0.0
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

impl StatusRecorder for InMemoryStatusRecorder {
    fn snapshot(&self) -> RecorderSnapshot {
        RecorderSnapshot {
            lifecycle: *self.lifecycle.read(),
            ingest_receive_time: from_millis(self.ingest_receive_time.load(Ordering::Relaxed)),
            post_processing_receive_time: from_millis(
                self.post_processing_receive_time.load(Ordering::Relaxed),
            ),
            post_indexing_receive_time: from_millis(
                self.post_indexing_receive_time.load(Ordering::Relaxed),
            ),
            uncommitted_entries: self.uncommitted_entries.load(Ordering::Relaxed),
            read_messages_1m_rate: f64::from_bits(
                self.read_messages_1m_rate.load(Ordering::Relaxed),
            ),
            written_messages_1m_rate: f64::from_bits(
                self.written_messages_1m_rate.load(Ordering::Relaxed),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_default_snapshot() {
        let snapshot = InMemoryStatusRecorder::new().snapshot();
        assert_eq!(snapshot.lifecycle, Lifecycle::Running);
        assert_eq!(snapshot.ingest_receive_time, DateTime::UNIX_EPOCH);
        assert_eq!(snapshot.post_indexing_receive_time, DateTime::UNIX_EPOCH);
        assert_eq!(snapshot.uncommitted_entries, 0);
        assert_eq!(snapshot.written_messages_1m_rate, 0.0);
    }

    #[test]
    fn test_receive_times_only_move_forward() {
        let recorder = InMemoryStatusRecorder::new();
        let now: DateTime<Utc> = "2019-01-01T00:05:00Z".parse().unwrap();

        recorder.update_ingest_receive_time(now);
        recorder.update_ingest_receive_time(now - Duration::minutes(1));
        recorder.update_post_processing_receive_time(now - Duration::seconds(1));
        recorder.update_post_indexing_receive_time(now - Duration::seconds(2));

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.ingest_receive_time, now);
        assert_eq!(
            snapshot.post_processing_receive_time,
            now - Duration::seconds(1)
        );
        assert_eq!(
            snapshot.post_indexing_receive_time,
            now - Duration::seconds(2)
        );
    }

    #[test]
    fn test_journal_counters() {
        let recorder = InMemoryStatusRecorder::new();
        recorder.set_lifecycle(Lifecycle::Halting);
        recorder.set_uncommitted_entries(123);
        recorder.set_read_messages_1m_rate(1.0);
        recorder.set_written_messages_1m_rate(2.0);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.lifecycle, Lifecycle::Halting);
        assert_eq!(snapshot.uncommitted_entries, 123);
        assert_eq!(snapshot.read_messages_1m_rate, 1.0);
        assert_eq!(snapshot.written_messages_1m_rate, 2.0);

        recorder.set_written_messages_1m_rate(f64::NAN);
        recorder.set_read_messages_1m_rate(-3.0);
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.written_messages_1m_rate, 0.0);
        assert_eq!(snapshot.read_messages_1m_rate, 0.0);
    }
}
