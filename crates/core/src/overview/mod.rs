//! Stage 1: snapshot every agreement into the overview artifact.

mod extractor;
mod writer;

pub use extractor::{AgreementExtractor, ExtractionReport, InstitutionFailure};
pub use writer::{OverviewArtifacts, OverviewWriter};

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{Agreement, RegistryError};

/// Errors that end the overview stage.
#[derive(Debug, Error)]
pub enum OverviewError {
    /// The registry session was lost; nothing is written.
    #[error("Registry session lost during extraction: {0}")]
    Session(#[source] RegistryError),

    /// The organisation list could not be fetched.
    #[error("Failed to list organisations: {0}")]
    ListInstitutions(#[source] RegistryError),

    /// An overview for today is already in place.
    #[error("Overview already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// One row of the overview artifact.
///
/// The operator fills in `status_change` with `VENTER`, `GODKEND` or `SLET`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverviewRow {
    #[serde(rename = "Instregnr")]
    pub institution_id: String,
    #[serde(rename = "Organisation")]
    pub organisation: String,
    #[serde(rename = "Institutionsnavn", default)]
    pub institution_name: String,
    #[serde(rename = "aftaleId")]
    pub agreement_id: String,
    #[serde(rename = "systemNavn", default)]
    pub system_name: String,
    #[serde(rename = "serviceNavn", default)]
    pub service_name: String,
    #[serde(rename = "status", default)]
    pub status: String,
    #[serde(rename = "statusændring", default)]
    pub status_change: String,
}

impl From<&Agreement> for OverviewRow {
    fn from(agreement: &Agreement) -> Self {
        Self {
            institution_id: agreement.institution.id.clone(),
            organisation: agreement.institution.kind.label().to_string(),
            institution_name: agreement.institution_name.clone(),
            agreement_id: agreement.agreement_id.clone(),
            system_name: agreement.system_name.clone(),
            service_name: agreement.service_name.clone(),
            status: agreement.current_status.as_str().to_string(),
            status_change: String::new(),
        }
    }
}

/// File names containing this marker are overview artifacts.
pub const OVERVIEW_MARKER: &str = "Oversigt";

/// Returns true if `file_name` names an overview artifact.
///
/// Office lock files (`~$...`) left next to an open artifact are ignored.
pub fn is_overview_file(file_name: &str) -> bool {
    !file_name.starts_with("~$")
        && file_name.contains(OVERVIEW_MARKER)
        && file_name.to_ascii_lowercase().ends_with(".csv")
}
