//! JetStream implementation of the [DocumentStore] trait.
//!
//! Documents are stored as JSON values in a key-value bucket, one key per node. Filters are
//! evaluated over a scan of the bucket. Every call is bounded by the configured timeout and a
//! timeout is reported as [Error::StoreUnavailable].

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::store::{Document, DocumentStore, Filter, assign_id};
use async_nats::ConnectOptions;
use async_nats::jetstream;
use async_nats::jetstream::Context;
use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Connects to NATS and returns the JetStream context.
pub async fn create_js_context(config: ClientConfig) -> Result<Context> {
    let mut opts = ConnectOptions::new()
        .max_reconnects(None) // unlimited reconnects
        .ping_interval(Duration::from_secs(3))
        .retry_on_initial_connect();

    if let (Some(user), Some(password)) = (config.user, config.password) {
        opts = opts.user_and_password(user, password);
    }

    let js_client = async_nats::connect_with_options(&config.url, opts)
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;

    Ok(jetstream::new(js_client))
}

#[derive(Clone)]
pub struct JetstreamDocumentStore {
    bucket: jetstream::kv::Store,
    name: String,
    timeout: Duration,
}

impl JetstreamDocumentStore {
    pub fn new(bucket: jetstream::kv::Store, name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bucket,
            name: name.into(),
            timeout,
        }
    }

    /// Opens the bucket, creating it (with a history of one revision per key) when it does not
    /// exist yet.
    pub async fn from_context(js_ctx: &Context, bucket_name: &str, timeout: Duration) -> Result<Self> {
        let bucket = match js_ctx.get_key_value(bucket_name).await {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!(?e, bucket_name, "Failed to get kv bucket, creating it");
                let bucket = js_ctx
                    .create_key_value(jetstream::kv::Config {
                        bucket: bucket_name.to_string(),
                        history: 1,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| {
                        Error::StoreUnavailable(format!(
                            "Failed to create kv bucket {bucket_name}: {e}"
                        ))
                    })?;
                info!(bucket_name, "Created processing status kv bucket");
                bucket
            }
        };

        Ok(Self::new(bucket, bucket_name, timeout))
    }

    async fn with_timeout<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                Error::StoreUnavailable(format!(
                    "{op} on {} timed out after {:?}",
                    self.name, self.timeout
                ))
            })?
    }

    async fn get_document(&self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self
            .bucket
            .get(key)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Failed to get {key}: {e}")))?
        else {
            return Ok(None);
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| Error::corruption(key, format!("invalid JSON: {e}")))
    }

    async fn scan(&self) -> Result<Vec<Document>> {
        let keys: Vec<String> = self
            .bucket
            .keys()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Failed to list keys: {e}")))?
            .try_collect()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Failed to list keys: {e}")))?;

        let mut documents = Vec::with_capacity(keys.len());
        for key in keys {
            // the key may have been deleted between listing and reading
            if let Some(body) = self.get_document(&key).await? {
                documents.push(Document { key, body });
            }
        }
        Ok(documents)
    }
}

impl DocumentStore for JetstreamDocumentStore {
    async fn upsert(&self, key: &str, body: Value) -> Result<Document> {
        self.with_timeout("upsert", async {
            let existing = self.get_document(key).await?;
            let body = assign_id(key, body, existing.as_ref())?;

            let payload = serde_json::to_vec(&body)
                .map_err(|e| Error::InvalidRecord(format!("failed to encode {key}: {e}")))?;
            self.bucket
                .put(key, Bytes::from(payload))
                .await
                .map_err(|e| Error::StoreUnavailable(format!("Failed to put {key}: {e}")))?;

            Ok(Document {
                key: key.to_string(),
                body,
            })
        })
        .await
    }

    async fn find_one(&self, key: &str) -> Result<Option<Document>> {
        self.with_timeout("find_one", async {
            Ok(self.get_document(key).await?.map(|body| Document {
                key: key.to_string(),
                body,
            }))
        })
        .await
    }

    async fn find_all(&self) -> Result<Vec<Document>> {
        self.with_timeout("find_all", self.scan()).await
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        self.with_timeout("find", async {
            let mut matched = Vec::new();
            for document in self.scan().await? {
                if filter
                    .evaluate(&document.body)
                    .map_err(|reason| Error::corruption(document.key.as_str(), reason))?
                {
                    matched.push(document);
                }
            }
            Ok(matched)
        })
        .await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(all(test, feature = "nats-tests"))]
mod tests {
    use super::*;
    use crate::store::FilterValue;
    use serde_json::json;

    async fn fresh_store(bucket_name: &str) -> JetstreamDocumentStore {
        let js_ctx = create_js_context(ClientConfig::default()).await.unwrap();
        let _ = js_ctx.delete_key_value(bucket_name).await; // Clean up if exists
        JetstreamDocumentStore::from_context(&js_ctx, bucket_name, Duration::from_secs(5))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let store = fresh_store("test_processing_status_upsert").await;

        let first = store
            .upsert("abc-123", json!({ "node_id": "abc-123", "rate": 1.0 }))
            .await
            .unwrap();
        let second = store
            .upsert("abc-123", json!({ "node_id": "abc-123", "rate": 3.0 }))
            .await
            .unwrap();
        assert_eq!(first.body["id"], second.body["id"]);

        store
            .upsert("abc-456", json!({ "node_id": "abc-456", "rate": 0.5 }))
            .await
            .unwrap();

        assert_eq!(store.find_all().await.unwrap().len(), 2);

        let found = store
            .find(&Filter::gte(&["rate"], FilterValue::Number(1.0)))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "abc-123");
        assert_eq!(found[0].body["rate"], json!(3.0));

        assert!(store.find_one("abc-789").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_json_is_corruption() {
        let store = fresh_store("test_processing_status_corrupt").await;
        store
            .bucket
            .put("abc-123", Bytes::from_static(b"{not json"))
            .await
            .unwrap();

        let result = store.find_all().await;
        assert!(matches!(result, Err(Error::DataCorruption { key, .. }) if key == "abc-123"));
    }
}
