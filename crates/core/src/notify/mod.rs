//! Operator notifications.
//!
//! Delivery is external to the robot. The `TracingNotifier` hands messages
//! to the log pipeline, addressed to the configured recipient.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no notification recipient configured")]
    NoRecipient,

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// A message for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Sends operator notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log, addressed to `recipient`.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier {
    recipient: Option<String>,
}

impl TracingNotifier {
    pub fn new(recipient: Option<String>) -> Self {
        Self {
            recipient: recipient.filter(|r| !r.trim().is_empty()),
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let Some(recipient) = &self.recipient else {
            warn!(subject = %notification.subject, "Notification dropped, no recipient configured");
            return Err(NotifyError::NoRecipient);
        };

        info!(
            recipient = %recipient,
            subject = %notification.subject,
            body = %notification.body,
            "Operator notification"
        );
        Ok(())
    }
}
