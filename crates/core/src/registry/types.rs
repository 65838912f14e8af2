//! Registry domain types: organisations, agreements and status values.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Organisations
// ============================================================================

/// The two organisation tabs in the registry portal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionKind {
    /// Schools and other institutions ("Institutioner").
    Institution,
    /// Childcare facilities ("Dagtilbud").
    Daycare,
}

impl InstitutionKind {
    /// Label used in the overview artifact and the queue payload.
    pub fn label(&self) -> &'static str {
        match self {
            InstitutionKind::Institution => "Institutioner",
            InstitutionKind::Daycare => "Dagtilbud",
        }
    }

    /// Parse the artifact label back into a kind.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Institutioner" => Some(InstitutionKind::Institution),
            "Dagtilbud" => Some(InstitutionKind::Daycare),
            _ => None,
        }
    }
}

impl fmt::Display for InstitutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of an organisation: its registration number within a kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstitutionRef {
    pub kind: InstitutionKind,
    /// Registration number ("Instregnr" / "kode").
    pub id: String,
}

impl InstitutionRef {
    pub fn new(kind: InstitutionKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for InstitutionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// An organisation holding agreements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Institution {
    pub id: String,
    pub name: String,
    pub kind: InstitutionKind,
}

impl Institution {
    pub fn reference(&self) -> InstitutionRef {
        InstitutionRef::new(self.kind, self.id.clone())
    }
}

// ============================================================================
// Agreements
// ============================================================================

/// Current status of an agreement as reported by the registry.
///
/// The registry owns this domain; values it introduces later are kept
/// verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgreementStatus {
    Approved,
    Pending,
    Deleted,
    Other(String),
}

impl AgreementStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgreementStatus::Approved => "GODKENDT",
            AgreementStatus::Pending => "VENTER",
            AgreementStatus::Deleted => "SLETTET",
            AgreementStatus::Other(s) => s,
        }
    }
}

impl From<&str> for AgreementStatus {
    fn from(value: &str) -> Self {
        match value.trim() {
            "GODKENDT" => AgreementStatus::Approved,
            "VENTER" => AgreementStatus::Pending,
            "SLETTET" => AgreementStatus::Deleted,
            other => AgreementStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for AgreementStatus {
    fn from(value: String) -> Self {
        AgreementStatus::from(value.as_str())
    }
}

impl From<AgreementStatus> for String {
    fn from(status: AgreementStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one agreement, fetched per extraction run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agreement {
    pub institution: InstitutionRef,
    pub institution_name: String,
    pub agreement_id: String,
    /// Provider system ("systemNavn").
    pub system_name: String,
    /// STIL service ("serviceNavn").
    pub service_name: String,
    pub current_status: AgreementStatus,
}

// ============================================================================
// Requested transitions
// ============================================================================

/// Status change an operator can request in the overview artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Await,
    Approve,
    Delete,
}

impl TargetStatus {
    pub const ALL: [TargetStatus; 3] = [
        TargetStatus::Await,
        TargetStatus::Approve,
        TargetStatus::Delete,
    ];

    /// Token the operator writes in the status-change column.
    pub fn token(&self) -> &'static str {
        match self {
            TargetStatus::Await => "VENTER",
            TargetStatus::Approve => "GODKEND",
            TargetStatus::Delete => "SLET",
        }
    }

    /// Recognize an operator token. Only the exact literals are accepted.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.token() == token)
    }

    /// Status the registry reports once the transition has been applied.
    pub fn resulting_status(&self) -> AgreementStatus {
        match self {
            TargetStatus::Await => AgreementStatus::Pending,
            TargetStatus::Approve => AgreementStatus::Approved,
            TargetStatus::Delete => AgreementStatus::Deleted,
        }
    }

    /// Prefix of queue element references.
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            TargetStatus::Await => "Vent",
            TargetStatus::Approve => "Godkend",
            TargetStatus::Delete => "Slet",
        }
    }

    /// Message recorded on a queue element once the change is applied.
    pub fn outcome_message(&self) -> &'static str {
        match self {
            TargetStatus::Await => "Aftale sat til venter.",
            TargetStatus::Approve => "Aftale godkendt.",
            TargetStatus::Delete => "Aftale slettet.",
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
