//! Agreement extraction across all selected organisations.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::ExtractionConfig;
use crate::metrics;
use crate::registry::{
    Agreement, Institution, InstitutionKind, InstitutionRef, RegistryError, RegistrySession,
};

use super::OverviewError;

/// An organisation whose agreements could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstitutionFailure {
    pub institution: InstitutionRef,
    pub name: String,
    pub attempts: u32,
    pub message: String,
}

/// Outcome of one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Agreements in the order they were fetched.
    pub agreements: Vec<Agreement>,
    /// Organisations skipped after failed fetches.
    pub failures: Vec<InstitutionFailure>,
    /// Organisations visited, including skipped ones.
    pub institutions_visited: usize,
}

/// Walks the selected organisations one at a time and collects their agreements.
pub struct AgreementExtractor {
    session: Arc<dyn RegistrySession>,
    config: ExtractionConfig,
}

impl AgreementExtractor {
    pub fn new(session: Arc<dyn RegistrySession>, config: ExtractionConfig) -> Self {
        Self { session, config }
    }

    /// Fetch the agreements of every selected organisation.
    ///
    /// A failing organisation is retried up to `fetch_attempts` times for
    /// recoverable errors, then skipped and recorded in the report. Only a
    /// lost session ends the run early.
    pub async fn extract(&self) -> Result<ExtractionReport, OverviewError> {
        let institutions = self.session.list_institutions().await.map_err(|e| {
            if e.is_session_error() {
                OverviewError::Session(e)
            } else {
                OverviewError::ListInstitutions(e)
            }
        })?;

        let selected = self.select(institutions);
        info!(
            institutions = selected.len(),
            include_institutions = self.config.include_institutions,
            include_daycare = self.config.include_daycare,
            "Extracting agreements"
        );

        let mut report = ExtractionReport::default();

        for institution in &selected {
            report.institutions_visited += 1;

            match self.fetch_with_retries(institution).await {
                Ok(agreements) => {
                    debug!(
                        institution = %institution.reference(),
                        agreements = agreements.len(),
                        "Fetched agreements"
                    );
                    metrics::AGREEMENTS_EXTRACTED.inc_by(agreements.len() as u64);
                    report.agreements.extend(agreements);
                }
                Err((e, _)) if e.is_session_error() => {
                    error!(
                        institution = %institution.reference(),
                        error = %e,
                        "Registry session lost, aborting extraction"
                    );
                    return Err(OverviewError::Session(e));
                }
                Err((e, attempts)) => {
                    warn!(
                        institution = %institution.reference(),
                        name = %institution.name,
                        attempts,
                        error = %e,
                        "Skipping institution"
                    );
                    metrics::INSTITUTIONS_SKIPPED
                        .with_label_values(&[institution.kind.label()])
                        .inc();
                    report.failures.push(InstitutionFailure {
                        institution: institution.reference(),
                        name: institution.name.clone(),
                        attempts,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            agreements = report.agreements.len(),
            skipped = report.failures.len(),
            "Extraction finished"
        );

        Ok(report)
    }

    /// Apply the organisation toggles; institutions come before daycare,
    /// each group in registration-number order.
    fn select(&self, institutions: Vec<Institution>) -> Vec<Institution> {
        let mut selected: Vec<Institution> = institutions
            .into_iter()
            .filter(|i| match i.kind {
                InstitutionKind::Institution => self.config.include_institutions,
                InstitutionKind::Daycare => self.config.include_daycare,
            })
            .collect();
        selected.sort_by_key(|i| i.reference());
        selected.dedup_by_key(|i| i.reference());
        selected
    }

    async fn fetch_with_retries(
        &self,
        institution: &Institution,
    ) -> Result<Vec<Agreement>, (RegistryError, u32)> {
        let max_attempts = self.config.fetch_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.session.list_agreements_for(institution).await {
                Ok(agreements) => return Ok(agreements),
                Err(e) if e.is_recoverable() && attempt < max_attempts => {
                    warn!(
                        institution = %institution.reference(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}
