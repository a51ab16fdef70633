//! The per-node processing status record and its persisted document shape.
//!
//! A [StatusRecord] is an immutable value. It is built either from a [RecorderSnapshot] when the
//! local node publishes, or from a persisted document when reading the cluster state back. Older
//! documents that predate the lifecycle and journal fields decode with documented defaults
//! ([Lifecycle::Running] and an all-zero [JournalInfo]).

use crate::error::{Error, Result};
use crate::recorder::RecorderSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub(crate) const FIELD_ID: &str = "id";
pub(crate) const FIELD_UPDATED_AT: &str = "updated_at";
pub(crate) const FIELD_INPUT_JOURNAL: &str = "input_journal";
pub(crate) const FIELD_WRITTEN_MESSAGES_1M_RATE: &str = "written_messages_1m_rate";

/// Lifecycle state of a node at the time it published its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    Uninitialized,
    Starting,
    #[default]
    Running,
    Paused,
    Halting,
    Failed,
    Throttled,
    OverrideLbDead,
    OverrideLbAlive,
    OverrideLbThrottled,
}

/// Latest receive timestamps of the three pipeline stages. In a healthy node
/// `ingest >= post_processing >= post_indexing`, but this is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveTimes {
    /// Latest message accepted into the pipeline.
    pub ingest: DateTime<Utc>,
    /// Latest message that finished processing.
    pub post_processing: DateTime<Utc>,
    /// Latest message confirmed durably indexed.
    pub post_indexing: DateTime<Utc>,
}

/// Backlog of the local input journal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JournalInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub uncommitted_entries: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub read_messages_1m_rate: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub written_messages_1m_rate: f64,
}

impl JournalInfo {
    fn validate(&self) -> std::result::Result<(), String> {
        for (name, rate) in [
            ("read_messages_1m_rate", self.read_messages_1m_rate),
            ("written_messages_1m_rate", self.written_messages_1m_rate),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(format!("{name} must be a finite, non-negative number, got {rate}"));
            }
        }
        Ok(())
    }
}

/// Persisted form of a [StatusRecord]. Field names are the compatibility contract with existing
/// documents, so they must not change.
#[derive(Debug, Serialize, Deserialize)]
struct StatusDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    node_id: String,
    // records written before the lifecycle and journal fields existed are backfilled
    #[serde(default, deserialize_with = "null_as_default")]
    node_lifecycle_status: Lifecycle,
    updated_at: DateTime<Utc>,
    receive_times: ReceiveTimes,
    #[serde(default, deserialize_with = "null_as_default")]
    input_journal: JournalInfo,
}

/// A null field decodes like an absent one. The store filter treats null the same way.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Status of one node at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    id: Option<String>,
    node_id: String,
    lifecycle: Lifecycle,
    updated_at: DateTime<Utc>,
    receive_times: ReceiveTimes,
    input_journal: JournalInfo,
}

impl StatusRecord {
    /// Creates a record that has not been persisted yet. The node id must not be empty and the
    /// journal rates must be finite and non-negative.
    pub fn new(
        node_id: impl Into<String>,
        lifecycle: Lifecycle,
        updated_at: DateTime<Utc>,
        receive_times: ReceiveTimes,
        input_journal: JournalInfo,
    ) -> Result<Self> {
        let node_id = node_id.into();
        if node_id.trim().is_empty() {
            return Err(Error::InvalidRecord("node id must not be empty".to_string()));
        }
        input_journal.validate().map_err(Error::InvalidRecord)?;

        Ok(Self {
            id: None,
            node_id,
            lifecycle,
            updated_at,
            receive_times,
            input_journal,
        })
    }

    /// Builds the record a node publishes from its recorder snapshot.
    pub fn of(
        node_id: impl Into<String>,
        snapshot: &RecorderSnapshot,
        updated_at: DateTime<Utc>,
    ) -> Result<Self> {
        Self::new(
            node_id,
            snapshot.lifecycle,
            updated_at,
            ReceiveTimes {
                ingest: snapshot.ingest_receive_time,
                post_processing: snapshot.post_processing_receive_time,
                post_indexing: snapshot.post_indexing_receive_time,
            },
            JournalInfo {
                uncommitted_entries: snapshot.uncommitted_entries,
                read_messages_1m_rate: snapshot.read_messages_1m_rate,
                written_messages_1m_rate: snapshot.written_messages_1m_rate,
            },
        )
    }

    /// Returns a copy carrying the store-assigned id.
    pub fn with_id(self, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..self
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn receive_times(&self) -> &ReceiveTimes {
        &self.receive_times
    }

    pub fn input_journal(&self) -> &JournalInfo {
        &self.input_journal
    }

    /// Renders the persisted document.
    pub fn to_document(&self) -> Result<Value> {
        let document = StatusDocument {
            id: self.id.clone(),
            node_id: self.node_id.clone(),
            node_lifecycle_status: self.lifecycle,
            updated_at: self.updated_at,
            receive_times: self.receive_times,
            input_journal: self.input_journal,
        };
        serde_json::to_value(document).map_err(|e| {
            Error::InvalidRecord(format!("failed to encode record of {}: {e}", self.node_id))
        })
    }

    /// Parses a persisted document stored under `key`. Anything that cannot be parsed, or that
    /// violates the value constraints, is reported as [Error::DataCorruption].
    pub fn from_document(key: &str, document: Value) -> Result<Self> {
        let document: StatusDocument =
            serde_json::from_value(document).map_err(|e| Error::corruption(key, e.to_string()))?;

        if document.node_id.trim().is_empty() {
            return Err(Error::corruption(key, "node_id is empty"));
        }
        document
            .input_journal
            .validate()
            .map_err(|reason| Error::corruption(key, reason))?;

        Ok(Self {
            id: document.id,
            node_id: document.node_id,
            lifecycle: document.node_lifecycle_status,
            updated_at: document.updated_at,
            receive_times: document.receive_times,
            input_journal: document.input_journal,
        })
    }
}
