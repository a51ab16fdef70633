//! Periodically publishes the local node's status.
//!
//! Every tick snapshots the recorder and saves it through the [StatusStore]. A failed cycle is
//! logged and skipped, the next tick is the retry.

use crate::error::{Error, Result};
use crate::recorder::StatusRecorder;
use crate::status_store::StatusStore;
use crate::store::DocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct StatusPublisher<S, R> {
    status_store: Arc<StatusStore<S>>,
    recorder: Arc<R>,
    persist_interval: Duration,
    cancellation_token: CancellationToken,
}

impl<S, R> StatusPublisher<S, R>
where
    S: DocumentStore,
    R: StatusRecorder + 'static,
{
    pub fn new(
        status_store: Arc<StatusStore<S>>,
        recorder: Arc<R>,
        persist_interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            status_store,
            recorder,
            persist_interval,
            cancellation_token,
        }
    }

    /// Publishes immediately and then once per interval until the token is cancelled. Returns
    /// [Error::Cancellation] if the token fires while a save is still in flight.
    pub async fn run(self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.persist_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            node_id = self.status_store.node_id(),
            interval = ?self.persist_interval,
            "Starting processing status publisher"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    info!("Cancellation token received, stopping processing status publisher");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let saved = tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    return Err(Error::Cancellation);
                }
                saved = self.status_store.save_now(self.recorder.as_ref()) => saved,
            };

            match saved {
                Ok(record) => debug!(updated_at = %record.updated_at(), "Published processing status"),
                Err(e) => warn!(?e, "Failed to publish processing status, retrying on the next tick"),
            }
        }
    }
}
