//! In-memory implementation of the [DocumentStore] trait for simple use cases and testing.
//!
//! Failures of the backing store can be injected: the next N reads or writes fail with
//! [Error::StoreUnavailable] as an unreachable store would.

use crate::error::{Error, Result};
use crate::store::{Document, DocumentStore, Filter, assign_id};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
pub struct InMemoryDocumentStore {
    name: &'static str,
    documents: Arc<RwLock<HashMap<String, Value>>>,
    fail_next_reads: Arc<AtomicUsize>,
    fail_next_writes: Arc<AtomicUsize>,
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("name", &self.name)
            .field("documents", &self.documents.read().len())
            .finish()
    }
}

impl InMemoryDocumentStore {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            documents: Arc::new(RwLock::new(HashMap::new())),
            fail_next_reads: Arc::new(AtomicUsize::new(0)),
            fail_next_writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Stores `body` under `key` exactly as given, bypassing id assignment. Used to seed
    /// documents written by other nodes or by older versions.
    pub fn insert_raw(&self, key: impl Into<String>, body: Value) {
        self.documents.write().insert(key.into(), body);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Fail the next `count` read operations.
    pub fn fail_reads(&self, count: usize) {
        self.fail_next_reads.store(count, Ordering::Relaxed);
    }

    /// Fail the next `count` write operations.
    pub fn fail_writes(&self, count: usize) {
        self.fail_next_writes.store(count, Ordering::Relaxed);
    }

    fn check_injected(&self, counter: &AtomicUsize, op: &str) -> Result<()> {
        let injected = counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::StoreUnavailable(format!(
                "injected {op} failure on {}",
                self.name
            )));
        }
        Ok(())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    async fn upsert(&self, key: &str, body: Value) -> Result<Document> {
        self.check_injected(&self.fail_next_writes, "upsert")?;

        let mut documents = self.documents.write();
        let body = assign_id(key, body, documents.get(key))?;
        documents.insert(key.to_string(), body.clone());

        Ok(Document {
            key: key.to_string(),
            body,
        })
    }

    async fn find_one(&self, key: &str) -> Result<Option<Document>> {
        self.check_injected(&self.fail_next_reads, "find_one")?;

        Ok(self.documents.read().get(key).map(|body| Document {
            key: key.to_string(),
            body: body.clone(),
        }))
    }

    async fn find_all(&self) -> Result<Vec<Document>> {
        self.check_injected(&self.fail_next_reads, "find_all")?;

        Ok(self
            .documents
            .read()
            .iter()
            .map(|(key, body)| Document {
                key: key.clone(),
                body: body.clone(),
            })
            .collect())
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        self.check_injected(&self.fail_next_reads, "find")?;

        let documents = self.documents.read();
        let mut matched = Vec::new();
        for (key, body) in documents.iter() {
            if filter
                .evaluate(body)
                .map_err(|reason| Error::corruption(key.as_str(), reason))?
            {
                matched.push(Document {
                    key: key.clone(),
                    body: body.clone(),
                });
            }
        }
        Ok(matched)
    }

    fn name(&self) -> &str {
        self.name
    }
}
