use crate::crosslisting::ListingProcessor;
use crate::store::{Store, StoreError};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("worker not available")]
    Closed,
    #[error("could not load unfinished requests: {0}")]
    Recovery(#[from] StoreError),
}

/// Bounded hand-off from the create handler to a single background worker.
/// Only request ids travel through the channel; the store holds the backlog.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Uuid>,
}

impl JobQueue {
    pub fn spawn(processor: ListingProcessor, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Uuid>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(request_id) = rx.recv().await {
                match processor.process(request_id).await {
                    Ok(outcome) => info!(
                        target = "crosslist.jobs",
                        request_id = %request_id,
                        status = outcome.status.as_str(),
                        succeeded = outcome.succeeded(),
                        "job_finished"
                    ),
                    Err(err) => warn!(
                        target = "crosslist.jobs",
                        request_id = %request_id,
                        code = err.code(),
                        error = %err.detail(),
                        "job_rejected"
                    ),
                }
            }
            info!(target = "crosslist.jobs", "worker_stopped");
        });

        (Self { tx }, handle)
    }

    pub async fn enqueue(&self, request_id: Uuid) -> Result<(), QueueError> {
        self.tx
            .send(request_id)
            .await
            .map_err(|_| QueueError::Closed)
    }

    /// Re-enqueues every request a previous process left `pending` or
    /// `in_progress`. Returns how many were queued.
    pub async fn recover(&self, store: &dyn Store) -> Result<usize, QueueError> {
        let unfinished = store.unfinished_requests().await?;
        let count = unfinished.len();
        for request_id in unfinished {
            if let Err(err) = self.enqueue(request_id).await {
                error!(target = "crosslist.jobs", request_id = %request_id, "recovery_enqueue_failed");
                return Err(err);
            }
        }
        if count > 0 {
            info!(target = "crosslist.jobs", count, "recovered_unfinished_requests");
        }
        Ok(count)
    }
}
