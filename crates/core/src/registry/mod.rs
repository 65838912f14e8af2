//! Registry session abstraction and the STIL portal client.
//!
//! The registry is reached through one authenticated, stateful session that
//! the operator unlocks by hand. Everything in this crate talks to it
//! through the [`RegistrySession`] trait; the login itself happens elsewhere.

mod rate_limiter;
mod stil;
mod types;

pub use rate_limiter::RateLimiter;
pub use stil::StilRegistryClient;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when talking to the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// No session credentials were handed over by the login flow.
    #[error("No registry session available: {0}")]
    SessionMissing(String),

    /// The registry no longer accepts the session (401/403).
    #[error("Registry session expired or rejected (HTTP {status})")]
    SessionExpired { status: u16 },

    /// Organisation or agreement does not exist.
    #[error("Not found in registry: {0}")]
    NotFound(String),

    /// The registry refused the requested transition.
    #[error("Registry rejected the request: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// The registry asked us to slow down.
    #[error("Registry rate limit exceeded")]
    RateLimitExceeded,

    /// Transient failure (timeout, connection reset, 5xx).
    #[error("Transient registry failure: {0}")]
    Transient(String),

    /// Failed to parse response.
    #[error("Failed to parse registry response: {0}")]
    ParseError(String),
}

/// How a registry failure affects the surrounding batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth trying the same item again later.
    Recoverable,
    /// The item can never succeed; record it and move on.
    Terminal,
    /// The session is gone; the whole stage must stop.
    Fatal,
}

impl RegistryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RegistryError::SessionMissing(_) | RegistryError::SessionExpired { .. } => {
                ErrorClass::Fatal
            }
            RegistryError::NotFound(_)
            | RegistryError::Rejected { .. }
            | RegistryError::ParseError(_) => ErrorClass::Terminal,
            RegistryError::HttpError(_)
            | RegistryError::RateLimitExceeded
            | RegistryError::Transient(_) => ErrorClass::Recoverable,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Recoverable
    }

    pub fn is_session_error(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

/// An authenticated handle to the registry portal.
///
/// Implementations are expected to count every underlying request against
/// a shared [`RateLimiter`].
#[async_trait]
pub trait RegistrySession: Send + Sync {
    /// List all organisations visible to the session.
    async fn list_institutions(&self) -> Result<Vec<Institution>, RegistryError>;

    /// Fetch the current agreements of one organisation.
    async fn list_agreements_for(
        &self,
        institution: &Institution,
    ) -> Result<Vec<Agreement>, RegistryError>;

    /// Apply a status transition to one agreement.
    async fn apply_status_transition(
        &self,
        institution: &InstitutionRef,
        agreement_id: &str,
        target: TargetStatus,
    ) -> Result<(), RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            RegistryError::SessionExpired { status: 401 }.class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            RegistryError::SessionMissing("no cookie".to_string()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            RegistryError::NotFound("aftale 7".to_string()).class(),
            ErrorClass::Terminal
        );
        assert_eq!(
            RegistryError::Rejected {
                status: 409,
                message: "already deleted".to_string()
            }
            .class(),
            ErrorClass::Terminal
        );
        assert!(RegistryError::Transient("502".to_string()).is_recoverable());
        assert!(RegistryError::RateLimitExceeded.is_recoverable());
        assert!(RegistryError::SessionExpired { status: 403 }.is_session_error());
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::Rejected {
            status: 400,
            message: "ugyldig status".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Registry rejected the request: 400 - ugyldig status"
        );
    }
}
