//! Processing status of the nodes of an ingest cluster.
//!
//! Every node periodically publishes a [StatusRecord] with its lifecycle, the latest receive
//! times of each processing stage and its input journal throughput. From the records of all nodes
//! the [WatermarkCalculator] derives the earliest post-indexing timestamp of the cluster, the
//! point up to which every active node has indexed what it received.

use crate::store::jetstream::{JetstreamDocumentStore, create_js_context};
use chrono::TimeDelta;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod error;
pub use error::{Error, Result};

/// Time source of the status store, swappable in tests.
pub mod clock;

/// Configurations for publishing and reading processing status, loaded from the environment.
pub mod config;

/// The persisted per-node record.
pub mod model;

/// Periodic publishing of the local node's record.
pub mod publisher;

/// Live counters of the local node that a record is snapshotted from.
pub mod recorder;

/// Which records count as active.
pub mod selection;

/// Per-node upsert and cluster-wide reads on top of a [store::DocumentStore].
pub mod status_store;

/// Document store abstraction and its in-memory and JetStream implementations.
pub mod store;

pub mod watermark;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StatusConfig;
pub use model::{JournalInfo, Lifecycle, ReceiveTimes, StatusRecord};
pub use publisher::StatusPublisher;
pub use recorder::{InMemoryStatusRecorder, RecorderSnapshot, StatusRecorder};
pub use selection::SelectionPredicate;
pub use status_store::StatusStore;
pub use watermark::{WatermarkCalculator, earliest_post_indexing};

/// Connects to JetStream and opens the status store of the local node.
pub async fn connect(config: &StatusConfig) -> Result<Arc<StatusStore<JetstreamDocumentStore>>> {
    let js_ctx = create_js_context(config.jetstream.clone()).await?;
    let store =
        JetstreamDocumentStore::from_context(&js_ctx, &config.bucket, config.store_timeout).await?;

    info!(
        node_id = %config.node_id,
        bucket = %config.bucket,
        url = %config.jetstream.url,
        "Connected to processing status store"
    );
    Ok(Arc::new(StatusStore::new(
        config.node_id.as_str(),
        store,
        Arc::new(SystemClock),
    )))
}

/// Watermark calculator using the thresholds of `config`.
pub fn watermark_calculator<S: store::DocumentStore>(
    status_store: Arc<StatusStore<S>>,
    config: &StatusConfig,
) -> Result<WatermarkCalculator<S>> {
    let update_threshold = TimeDelta::from_std(config.update_threshold)
        .map_err(|e| Error::Config(format!("update threshold out of range: {e}")))?;

    Ok(WatermarkCalculator::new(
        status_store,
        update_threshold,
        config.journal_write_rate_threshold,
    ))
}

/// Publisher of `recorder` using the interval of `config`. The caller spawns
/// [StatusPublisher::run].
pub fn status_publisher<S: store::DocumentStore, R: StatusRecorder + 'static>(
    status_store: Arc<StatusStore<S>>,
    recorder: Arc<R>,
    config: &StatusConfig,
    cancellation_token: CancellationToken,
) -> StatusPublisher<S, R> {
    StatusPublisher::new(
        status_store,
        recorder,
        config.persist_interval,
        cancellation_token,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::in_memory::InMemoryDocumentStore;
    use std::collections::HashMap;
    use std::time::Duration;

    fn config() -> StatusConfig {
        let env_vars: HashMap<String, String> = [
            ("PROCESSING_STATUS_NODE_ID", "abc-123"),
            ("PROCESSING_STATUS_UPDATE_THRESHOLD_MS", "14400000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        StatusConfig::load(env_vars).unwrap()
    }

    #[tokio::test]
    async fn test_configured_calculator_and_publisher() {
        let config = config();
        let store = InMemoryDocumentStore::new("processing_status");
        let clock = ManualClock::new("2019-01-01T02:01:00Z".parse().unwrap());
        let status_store = Arc::new(StatusStore::new(
            config.node_id.as_str(),
            store.clone(),
            Arc::new(clock.clone()),
        ));

        let recorder = Arc::new(InMemoryStatusRecorder::new());
        recorder.update_post_indexing_receive_time("2019-01-01T00:01:00Z".parse().unwrap());
        recorder.set_written_messages_1m_rate(12.0);

        let cancel = CancellationToken::new();
        let publisher = status_publisher(
            Arc::clone(&status_store),
            Arc::clone(&recorder),
            &config,
            cancel.clone(),
        );
        let handle = tokio::spawn(publisher.run());
        while store.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), Ok(()));

        let calculator = watermark_calculator(status_store, &config).unwrap();
        assert_eq!(
            calculator.earliest_post_indexing_timestamp().await.unwrap(),
            Some("2019-01-01T00:01:00Z".parse().unwrap())
        );
    }

    #[cfg(feature = "nats-tests")]
    #[tokio::test]
    async fn test_connect() {
        let mut config = config();
        config.bucket = "test_processing_status_connect".to_string();

        let status_store = connect(&config).await.unwrap();
        let saved = status_store
            .save_now(&InMemoryStatusRecorder::new())
            .await
            .unwrap();
        assert_eq!(
            status_store.get_for_local_node().await.unwrap(),
            Some(saved)
        );
    }
}
