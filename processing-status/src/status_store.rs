//! Keeps one [StatusRecord] per node in a [DocumentStore].
//!
//! The store is bound to the local node: [StatusStore::save] always upserts under the local node
//! id, while the read operations see every node of the cluster.

use crate::clock::Clock;
use crate::error::Result;
use crate::model::StatusRecord;
use crate::recorder::StatusRecorder;
use crate::selection::SelectionPredicate;
use crate::store::{Document, DocumentStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

pub struct StatusStore<S> {
    node_id: String,
    store: S,
    clock: Arc<dyn Clock>,
    /// Serializes saves of the local node, so a snapshot taken earlier can never overwrite one
    /// taken later.
    write_lock: Mutex<()>,
}

impl<S: DocumentStore> StatusStore<S> {
    pub fn new(node_id: impl Into<String>, store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            node_id: node_id.into(),
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Snapshots `recorder` and upserts the resulting record for the local node with
    /// `updated_at = now`. Returns the persisted record with its store id.
    pub async fn save(&self, recorder: &impl StatusRecorder, now: DateTime<Utc>) -> Result<StatusRecord> {
        let _guard = self.write_lock.lock().await;

        // snapshot under the lock so the newest counters are always written last
        let record = StatusRecord::of(self.node_id.as_str(), &recorder.snapshot(), now)?;
        let document = self
            .store
            .upsert(&self.node_id, record.to_document()?)
            .await?;

        let saved = decode(document)?;
        debug!(
            node_id = %self.node_id,
            updated_at = %saved.updated_at(),
            post_indexing = %saved.receive_times().post_indexing,
            "Saved processing status"
        );
        Ok(saved)
    }

    /// [StatusStore::save] stamped with the current time of the clock.
    pub async fn save_now(&self, recorder: &impl StatusRecorder) -> Result<StatusRecord> {
        self.save(recorder, self.clock.now_utc()).await
    }

    /// Every node's current record, oldest `updated_at` first. One malformed document fails the
    /// whole read.
    pub async fn all(&self) -> Result<Vec<StatusRecord>> {
        let mut records = self
            .store
            .find_all()
            .await?
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>>>()?;

        sort_by_update(&mut records);
        trace!(count = records.len(), store = self.store.name(), "Loaded processing status records");
        Ok(records)
    }

    /// The local node's record, if it has published one.
    pub async fn get_for_local_node(&self) -> Result<Option<StatusRecord>> {
        self.store
            .find_one(&self.node_id)
            .await?
            .map(decode)
            .transpose()
    }

    /// Records matching `predicate`, selected by the store. Oldest `updated_at` first.
    pub async fn find_active(&self, predicate: &SelectionPredicate) -> Result<Vec<StatusRecord>> {
        let filter = predicate.to_filter();
        trace!(%filter, "Querying active processing status records");

        let mut records = self
            .store
            .find(&filter)
            .await?
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>>>()?;

        sort_by_update(&mut records);
        Ok(records)
    }
}

fn decode(document: Document) -> Result<StatusRecord> {
    StatusRecord::from_document(&document.key, document.body)
}

/// Orders by `updated_at`, then node id so equal timestamps come back in a stable order.
fn sort_by_update(records: &mut [StatusRecord]) {
    records.sort_by(|a, b| {
        a.updated_at()
            .cmp(&b.updated_at())
            .then_with(|| a.node_id().cmp(b.node_id()))
    });
}
