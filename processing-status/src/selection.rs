//! Decides which node records count towards the cluster watermark.
//!
//! A record is active when it was updated less than the staleness threshold ago and its journal
//! write rate reaches the cutoff. A record exactly one threshold old is already stale. A node that is not writing to its journal cannot hold the watermark
//! back. The same condition is rendered twice, as an in-memory check and as a store [Filter], and
//! both renderings must agree on every record.

use crate::model::{FIELD_INPUT_JOURNAL, FIELD_UPDATED_AT, FIELD_WRITTEN_MESSAGES_1M_RATE, StatusRecord};
use crate::store::{Filter, FilterValue};
use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionPredicate {
    /// Records must be updated strictly after this instant to count as fresh.
    updated_since: DateTime<Utc>,
    /// Minimum journal write rate, in the unit the recorder reports.
    min_written_rate: f64,
}

impl SelectionPredicate {
    pub fn new(now: DateTime<Utc>, threshold: TimeDelta, journal_write_rate_cutoff: f64) -> Self {
        Self {
            updated_since: now
                .checked_sub_signed(threshold)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            min_written_rate: journal_write_rate_cutoff,
        }
    }

    pub fn updated_since(&self) -> DateTime<Utc> {
        self.updated_since
    }

    pub fn min_written_rate(&self) -> f64 {
        self.min_written_rate
    }

    pub fn matches(&self, record: &StatusRecord) -> bool {
        record.updated_at() > self.updated_since
            && record.input_journal().written_messages_1m_rate >= self.min_written_rate
    }

    /// Store-side form of [SelectionPredicate::matches]. Documents without journal info, or with
    /// a null write rate, count as writing nothing, the same default applied when they are decoded.
    pub fn to_filter(&self) -> Filter {
        Filter::And(vec![
            Filter::gt(
                &[FIELD_UPDATED_AT],
                FilterValue::Timestamp(self.updated_since),
            ),
            Filter::gte_or(
                &[FIELD_INPUT_JOURNAL, FIELD_WRITTEN_MESSAGES_1M_RATE],
                FilterValue::Number(self.min_written_rate),
                FilterValue::Number(0.0),
            ),
        ])
    }
}
