//! Work queue storage trait and types.

use std::fmt;

use chrono::{DateTime, Utc};

use super::{
    Failure, InvalidTransition, NewQueueElement, PushOutcome, QueueElement, QueueState,
    RetryPolicy,
};

/// Error type for work queue operations.
#[derive(Debug)]
pub enum QueueError {
    /// Element not found.
    NotFound(String),
    /// The element's state does not allow the operation.
    InvalidState {
        element_id: String,
        transition: InvalidTransition,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::NotFound(id) => write!(f, "Queue element not found: {}", id),
            QueueError::InvalidState {
                element_id,
                transition,
            } => write!(f, "Queue element {}: {}", element_id, transition),
            QueueError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Database(e.to_string())
    }
}

/// Filter for querying queue elements.
#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    /// Filter by state (retryable and terminal failures are distinct).
    pub state: Option<QueueState>,
    /// Filter by reference.
    pub reference: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl QueueFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            state: None,
            reference: None,
            limit: 1000,
            offset: 0,
        }
    }

    pub fn with_state(mut self, state: QueueState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Durable, at-least-once store of queue elements for one named queue.
///
/// Every state change goes through [`QueueState::on`].
pub trait WorkQueue: Send + Sync {
    /// Name of the queue this store serves.
    fn name(&self) -> &str;

    /// Enqueue one element unless its reference is already queued.
    fn push(&self, element: NewQueueElement) -> Result<PushOutcome, QueueError>;

    /// Enqueue several elements atomically: either all outcomes are
    /// recorded or nothing is written.
    fn push_batch(&self, elements: Vec<NewQueueElement>) -> Result<Vec<PushOutcome>, QueueError>;

    /// Claim the next eligible element in creation order and mark it in progress.
    ///
    /// Eligible: `new`, or a retryable failure whose retry time is at or before `now`.
    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<QueueElement>, QueueError>;

    /// Mark an in-progress element done.
    fn complete(&self, id: &str, message: &str) -> Result<QueueElement, QueueError>;

    /// Mark an in-progress element failed.
    ///
    /// Recoverable failures count against `policy.max_attempts`; once
    /// exhausted the failure becomes terminal.
    fn fail(
        &self,
        id: &str,
        failure: &Failure,
        policy: &RetryPolicy,
    ) -> Result<QueueElement, QueueError>;

    /// Return an in-progress element to `new` without counting an attempt.
    fn release(&self, id: &str, message: &str) -> Result<QueueElement, QueueError>;

    /// Get an element by ID.
    fn get(&self, id: &str) -> Result<Option<QueueElement>, QueueError>;

    /// List elements matching the filter, in creation order.
    fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueElement>, QueueError>;

    /// Count elements matching the filter.
    fn count(&self, filter: &QueueFilter) -> Result<i64, QueueError>;

    /// Earliest retry time among retryable failures.
    fn next_retry_at(&self) -> Result<Option<DateTime<Utc>>, QueueError>;

    /// Fail every element left in progress by an interrupted run.
    fn recover_interrupted(&self, policy: &RetryPolicy) -> Result<Vec<QueueElement>, QueueError>;
}
