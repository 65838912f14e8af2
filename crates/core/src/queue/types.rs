//! Work queue element types and the element state machine.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::QueueConfig;
use crate::registry::{AgreementStatus, InstitutionRef, TargetStatus};

// ============================================================================
// State machine
// ============================================================================

/// Processing state of a queue element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueState {
    New,
    InProgress,
    Done,
    /// `retryable` elements go back to `New` once their retry time has come;
    /// the others are final.
    Failed { retryable: bool },
}

/// Something that happens to a queue element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    Claim,
    Succeed,
    Fail { retryable: bool },
    Requeue,
    /// Hand an in-progress element back untouched; the attempt never reached
    /// the registry.
    Release,
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub state: QueueState,
    pub event: QueueEvent,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot {} an element that is {}", self.event, self.state)
    }
}

impl std::error::Error for InvalidTransition {}

impl QueueState {
    /// Apply `event`, returning the next state.
    ///
    /// `new -> in_progress -> {done, failed}`. Only a retryable failure or a
    /// released in-progress element may go back to `new`.
    pub fn on(self, event: QueueEvent) -> Result<QueueState, InvalidTransition> {
        match (self, event) {
            (QueueState::New, QueueEvent::Claim) => Ok(QueueState::InProgress),
            (QueueState::InProgress, QueueEvent::Succeed) => Ok(QueueState::Done),
            (QueueState::InProgress, QueueEvent::Fail { retryable }) => {
                Ok(QueueState::Failed { retryable })
            }
            (QueueState::Failed { retryable: true }, QueueEvent::Requeue) => Ok(QueueState::New),
            (QueueState::InProgress, QueueEvent::Release) => Ok(QueueState::New),
            (state, event) => Err(InvalidTransition { state, event }),
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueState::Done | QueueState::Failed { retryable: false })
    }

    /// Column value used by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::New => "new",
            QueueState::InProgress => "in_progress",
            QueueState::Done => "done",
            QueueState::Failed { .. } => "failed",
        }
    }

    /// Rebuild a state from its stored columns.
    pub fn from_parts(state: &str, retryable: bool) -> Option<Self> {
        match state {
            "new" => Some(QueueState::New),
            "in_progress" => Some(QueueState::InProgress),
            "done" => Some(QueueState::Done),
            "failed" => Some(QueueState::Failed { retryable }),
            _ => None,
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueState::Failed { retryable: true } => f.write_str("failed (retryable)"),
            QueueState::Failed { retryable: false } => f.write_str("failed (terminal)"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl fmt::Display for QueueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueEvent::Claim => f.write_str("claim"),
            QueueEvent::Succeed => f.write_str("complete"),
            QueueEvent::Fail { .. } => f.write_str("fail"),
            QueueEvent::Requeue => f.write_str("requeue"),
            QueueEvent::Release => f.write_str("release"),
        }
    }
}

// ============================================================================
// Elements
// ============================================================================

/// Payload of a queue element: one requested transition of one agreement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementData {
    pub agreement_id: String,
    pub institution: InstitutionRef,
    pub system_name: String,
    pub service_name: String,
    /// Status shown in the overview the change was requested from.
    pub current_status: AgreementStatus,
    pub requested_status: TargetStatus,
}

impl ElementData {
    /// Queue reference: `<Prefix>_<first 8 hex chars of md5>`.
    ///
    /// The hash covers the agreement snapshot as canonical JSON (sorted keys),
    /// so the same row uploaded twice yields the same reference. Eight hex
    /// chars collide between distinct rows; deduplication uses
    /// [`ElementData::fingerprint`] instead.
    pub fn reference(&self) -> String {
        let digest = md5::compute(self.snapshot().to_string().as_bytes());
        let hex = format!("{:x}", digest);
        format!("{}_{}", self.requested_status.reference_prefix(), &hex[..8])
    }

    /// Full MD5 of the snapshot plus the requested change. Equal fingerprints
    /// mean the same change of the same agreement.
    pub fn fingerprint(&self) -> String {
        let mut canonical = self.snapshot();
        canonical["requested_status"] = json!(self.requested_status.token());
        format!("{:x}", md5::compute(canonical.to_string().as_bytes()))
    }

    fn snapshot(&self) -> serde_json::Value {
        json!({
            "agreement_id": self.agreement_id,
            "institution_id": self.institution.id,
            "institution_kind": self.institution.kind.label(),
            "system_name": self.system_name,
            "service_name": self.service_name,
            "current_status": self.current_status.as_str(),
        })
    }
}

/// Element to be pushed onto the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueElement {
    /// Display reference, not unique.
    pub reference: String,
    /// Deduplication key.
    pub fingerprint: String,
    pub data: ElementData,
}

impl From<ElementData> for NewQueueElement {
    fn from(data: ElementData) -> Self {
        Self {
            reference: data.reference(),
            fingerprint: data.fingerprint(),
            data,
        }
    }
}

/// A durable work item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueElement {
    pub id: String,
    pub queue_name: String,
    pub reference: String,
    pub data: ElementData,
    pub state: QueueState,
    /// Recoverable failures so far.
    pub attempt_count: u32,
    /// Outcome or last error.
    pub message: Option<String>,
    /// Earliest time a retryable failure may be claimed again.
    pub retry_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of pushing one element.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Queued(QueueElement),
    /// The same change is already on the queue; the stored element is returned as-is.
    AlreadyQueued(QueueElement),
}

impl PushOutcome {
    pub fn element(&self) -> &QueueElement {
        match self {
            PushOutcome::Queued(e) | PushOutcome::AlreadyQueued(e) => e,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, PushOutcome::Queued(_))
    }
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub retryable: bool,
    pub message: String,
}

impl Failure {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

/// How often and how soon recoverable failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Recoverable failures allowed before an element fails for good.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
