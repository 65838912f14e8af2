//! Queue processor implementation.
//!
//! Applies queued status changes to the registry strictly one element at a
//! time; the registry session is single and stateful.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::queue::{Failure, QueueElement, QueueFilter, QueueState, WorkQueue};
use crate::registry::{ErrorClass, RegistrySession};

use super::config::ProcessorConfig;
use super::types::{ElementFailure, ProcessorError, ProcessorSummary};

/// Drains the work queue against the registry.
pub struct QueueProcessor {
    config: ProcessorConfig,
    session: Arc<dyn RegistrySession>,
    queue: Arc<dyn WorkQueue>,
}

impl QueueProcessor {
    pub fn new(
        config: ProcessorConfig,
        session: Arc<dyn RegistrySession>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            config,
            session,
            queue,
        }
    }

    /// Process elements until nothing is left to claim.
    ///
    /// Elements a previous run left in progress are recovered first. A lost
    /// session stops the run; every other failure is recorded against its
    /// element and processing continues.
    pub async fn run(&self) -> Result<ProcessorSummary, ProcessorError> {
        info!(queue = %self.queue.name(), "Starting queue processing");

        let mut summary = ProcessorSummary::default();

        let recovered = self.queue.recover_interrupted(&self.config.retry)?;
        for element in &recovered {
            warn!(
                reference = %element.reference,
                state = %element.state,
                "Recovered element interrupted by a previous run"
            );
            if element.state.is_terminal() {
                summary.failures.push(ElementFailure::from_element(element));
            }
        }
        summary.recovered = recovered.len();

        loop {
            let Some(element) = self.queue.claim_next(Utc::now())? else {
                match self.queue.next_retry_at()? {
                    Some(retry_at) if self.config.wait_for_retries => {
                        let wait = (retry_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                        info!(
                            wait_secs = wait.as_secs(),
                            "Waiting for scheduled retries"
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    _ => break,
                }
            };

            self.process(element, &mut summary).await?;
        }

        summary.pending_retries = self
            .queue
            .count(&QueueFilter::new().with_state(QueueState::Failed { retryable: true }))?
            as usize;

        info!(
            attempts = summary.attempts,
            succeeded = summary.succeeded,
            retried = summary.retried,
            failed = summary.failures.len(),
            pending_retries = summary.pending_retries,
            "Queue processing finished"
        );

        Ok(summary)
    }

    async fn process(
        &self,
        element: QueueElement,
        summary: &mut ProcessorSummary,
    ) -> Result<(), ProcessorError> {
        let data = &element.data;
        let target = data.requested_status;
        summary.attempts += 1;

        debug!(
            element_id = %element.id,
            reference = %element.reference,
            agreement_id = %data.agreement_id,
            institution = %data.institution,
            target = %target,
            attempt = element.attempt_count + 1,
            "Applying status change"
        );

        let result = self
            .session
            .apply_status_transition(&data.institution, &data.agreement_id, target)
            .await;

        let error = match result {
            Ok(()) => {
                self.queue.complete(&element.id, target.outcome_message())?;
                metrics::QUEUE_ELEMENTS_PROCESSED
                    .with_label_values(&["done"])
                    .inc();
                info!(
                    reference = %element.reference,
                    agreement_id = %data.agreement_id,
                    "{}",
                    target.outcome_message()
                );
                summary.succeeded += 1;
                return Ok(());
            }
            Err(e) => e,
        };

        match error.class() {
            ErrorClass::Fatal => {
                // The session was rejected, not the change; no attempt is counted.
                self.queue
                    .release(&element.id, &format!("session lost: {}", error))?;
                error!(
                    reference = %element.reference,
                    error = %error,
                    "Registry session lost, stopping"
                );
                Err(ProcessorError::SessionLost {
                    reference: element.reference,
                    source: error,
                })
            }
            ErrorClass::Recoverable => {
                let failed = self.queue.fail(
                    &element.id,
                    &Failure::recoverable(error.to_string()),
                    &self.config.retry,
                )?;
                if failed.state.is_terminal() {
                    self.record_terminal(&failed, summary);
                } else {
                    metrics::QUEUE_ELEMENTS_PROCESSED
                        .with_label_values(&["retry"])
                        .inc();
                    warn!(
                        reference = %failed.reference,
                        attempt = failed.attempt_count,
                        max_attempts = self.config.retry.max_attempts,
                        error = %error,
                        "Status change failed, will retry"
                    );
                    summary.retried += 1;
                }
                Ok(())
            }
            ErrorClass::Terminal => {
                let failed = self.queue.fail(
                    &element.id,
                    &Failure::terminal(error.to_string()),
                    &self.config.retry,
                )?;
                self.record_terminal(&failed, summary);
                Ok(())
            }
        }
    }

    fn record_terminal(&self, element: &QueueElement, summary: &mut ProcessorSummary) {
        metrics::QUEUE_ELEMENTS_PROCESSED
            .with_label_values(&["failed"])
            .inc();
        error!(
            reference = %element.reference,
            agreement_id = %element.data.agreement_id,
            institution = %element.data.institution,
            message = element.message.as_deref().unwrap_or(""),
            "Status change failed permanently"
        );
        summary.failures.push(ElementFailure::from_element(element));
    }
}
