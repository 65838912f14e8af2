//! Types for the queue processor.

use serde::Serialize;
use thiserror::Error;

use crate::queue::{QueueElement, QueueError};
use crate::registry::{InstitutionRef, RegistryError, TargetStatus};

/// Errors that end a handle-queue run.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Queue storage failed.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// The registry session was lost while applying `reference`.
    #[error("registry session lost while processing {reference}: {source}")]
    SessionLost {
        reference: String,
        #[source]
        source: RegistryError,
    },
}

/// An element that failed for good during this run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ElementFailure {
    pub element_id: String,
    pub reference: String,
    pub agreement_id: String,
    pub institution: InstitutionRef,
    pub target: TargetStatus,
    pub message: String,
}

impl ElementFailure {
    pub(crate) fn from_element(element: &QueueElement) -> Self {
        Self {
            element_id: element.id.clone(),
            reference: element.reference.clone(),
            agreement_id: element.data.agreement_id.clone(),
            institution: element.data.institution.clone(),
            target: element.data.requested_status,
            message: element.message.clone().unwrap_or_default(),
        }
    }
}

/// Counters for one handle-queue run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ProcessorSummary {
    /// Elements found in progress at start and handed back for retry.
    pub recovered: usize,
    /// Attempts made, retries included.
    pub attempts: usize,
    pub succeeded: usize,
    /// Recoverable failures scheduled for another attempt.
    pub retried: usize,
    /// Elements that failed for good.
    pub failures: Vec<ElementFailure>,
    /// Retryable elements left for a later run.
    pub pending_retries: usize,
}

impl ProcessorSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InstitutionKind;

    #[test]
    fn test_error_display() {
        let err = ProcessorError::SessionLost {
            reference: "Slet_0a1b2c3d".to_string(),
            source: RegistryError::SessionExpired { status: 401 },
        };
        assert_eq!(
            err.to_string(),
            "registry session lost while processing Slet_0a1b2c3d: Registry session expired or rejected (HTTP 401)"
        );
    }

    #[test]
    fn test_summary_serialization() {
        let summary = ProcessorSummary {
            succeeded: 2,
            failures: vec![ElementFailure {
                element_id: "e1".to_string(),
                reference: "Slet_0a1b2c3d".to_string(),
                agreement_id: "A1".to_string(),
                institution: InstitutionRef::new(InstitutionKind::Institution, "751001"),
                target: TargetStatus::Delete,
                message: "rejected".to_string(),
            }],
            ..ProcessorSummary::default()
        };

        assert!(summary.has_failures());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["succeeded"], 2);
        assert_eq!(json["failures"][0]["target"], "delete");
    }
}
