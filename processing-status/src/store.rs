//! Document store abstraction the processing status is persisted in.
//!
//! A store keeps one JSON document per key, replaces documents whole on upsert and can evaluate a
//! [Filter] against what it holds. Each document carries an `id` field that the store assigns on
//! first insert and preserves on every later upsert of the same key.

use crate::error::Result;
use serde_json::Value;

/// Query fragments evaluated by the store.
pub mod filter;

/// In-memory store for tests and single-process setups.
pub mod in_memory;

/// NATS JetStream key-value backed store.
pub mod jetstream;

pub use filter::{Comparison, Filter, FilterValue};

/// A stored document and the key it lives under.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub body: Value,
}

/// Store is the trait that defines the interface for the external document store. Connection
/// failures and timeouts are reported as [crate::Error::StoreUnavailable], documents that cannot
/// be evaluated as [crate::Error::DataCorruption].
#[trait_variant::make(Send)]
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Inserts the document under `key` or replaces the existing one. The returned document has
    /// its `id` set, newly assigned on insert and carried over on replace.
    async fn upsert(&self, key: &str, body: Value) -> Result<Document>;

    /// Returns the document stored under `key`.
    async fn find_one(&self, key: &str) -> Result<Option<Document>>;

    /// Returns every document in the store, in no particular order.
    async fn find_all(&self) -> Result<Vec<Document>>;

    /// Returns the documents matching `filter`, in no particular order.
    async fn find(&self, filter: &Filter) -> Result<Vec<Document>>;

    /// Name of the bucket or collection.
    fn name(&self) -> &str;
}

/// Generates a new document id.
pub(crate) fn new_document_id() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

/// Sets the `id` of `body`, keeping the id of the `existing` document when there is one.
pub(crate) fn assign_id(key: &str, body: Value, existing: Option<&Value>) -> Result<Value> {
    let Value::Object(mut fields) = body else {
        return Err(crate::Error::InvalidRecord(format!(
            "document for {key} must be a JSON object"
        )));
    };

    let id = existing
        .and_then(|doc| doc.get(crate::model::FIELD_ID))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(new_document_id);

    fields.insert(crate::model::FIELD_ID.to_string(), Value::String(id));
    Ok(Value::Object(fields))
}
