//! Pushing a change set onto the work queue.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::metrics;
use crate::queue::{ElementData, NewQueueElement, PushOutcome, QueueElement, WorkQueue};

use super::{ChangeSet, UploadError};

/// Outcome of one upload run.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub source: PathBuf,
    pub rows_read: usize,
    /// Elements created by this run.
    pub queued: Vec<QueueElement>,
    /// Changes with the same fingerprint already on the queue, as stored there.
    pub already_queued: Vec<QueueElement>,
    /// Rows asking for the status the agreement already has. Never queued.
    pub unchanged: Vec<ElementData>,
}

/// Pushes change sets onto the work queue in one batch.
pub struct QueueUploader {
    queue: Arc<dyn WorkQueue>,
}

impl QueueUploader {
    pub fn new(queue: Arc<dyn WorkQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue every change. The batch is written atomically and changes
    /// already on the queue are skipped.
    pub fn upload(&self, change_set: ChangeSet) -> Result<UploadReport, UploadError> {
        let elements: Vec<NewQueueElement> = change_set
            .changes
            .into_iter()
            .map(NewQueueElement::from)
            .collect();

        let outcomes = self.queue.push_batch(elements)?;

        let mut queued = Vec::new();
        let mut already_queued = Vec::new();
        for outcome in outcomes {
            match outcome {
                PushOutcome::Queued(element) => {
                    debug!(reference = %element.reference, "Queued status change");
                    metrics::QUEUE_ELEMENTS_UPLOADED
                        .with_label_values(&["queued"])
                        .inc();
                    queued.push(element);
                }
                PushOutcome::AlreadyQueued(element) => {
                    info!(
                        reference = %element.reference,
                        state = %element.state,
                        "Status change already queued, skipping"
                    );
                    metrics::QUEUE_ELEMENTS_UPLOADED
                        .with_label_values(&["already_queued"])
                        .inc();
                    already_queued.push(element);
                }
            }
        }

        info!(
            queue = %self.queue.name(),
            queued = queued.len(),
            already_queued = already_queued.len(),
            unchanged = change_set.unchanged.len(),
            "Upload finished"
        );

        Ok(UploadReport {
            source: change_set.source,
            rows_read: change_set.rows_read,
            queued,
            already_queued,
            unchanged: change_set.unchanged,
        })
    }
}
