//! The three robot stages, wired from configuration.
//!
//! Each stage is a single entry point so the binary and the integration
//! tests drive exactly the same code.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::Config;
use crate::overview::{
    AgreementExtractor, ExtractionReport, OverviewArtifacts, OverviewError, OverviewWriter,
};
use crate::processor::{ProcessorConfig, ProcessorError, ProcessorSummary, QueueProcessor};
use crate::queue::{QueueError, SqliteWorkQueue, WorkQueue};
use crate::registry::RegistrySession;
use crate::upload::{ChangeReader, QueueUploader, UploadError, UploadReport};

/// Result of the create-overview stage.
#[derive(Debug, Clone)]
pub struct OverviewOutcome {
    pub artifacts: OverviewArtifacts,
    pub report: ExtractionReport,
    /// Previous artifacts deleted because of `replace_existing`.
    pub removed: Vec<PathBuf>,
}

/// Open the configured work queue. A relative database path is resolved
/// against the base directory.
pub fn open_queue(config: &Config) -> Result<SqliteWorkQueue, QueueError> {
    let path = if config.queue.database_path.is_absolute() {
        config.queue.database_path.clone()
    } else {
        config.base_dir.join(&config.queue.database_path)
    };

    info!(path = %path.display(), queue = %config.queue.name, "Opening work queue");
    SqliteWorkQueue::new(&path, config.queue.name.clone())
}

/// Snapshot every agreement of the selected organisations into the
/// overview artifact for `date`.
///
/// Without `replace_existing` an overview of any date already in the output
/// directory ends the stage before any registry call is made. The upload
/// stage accepts exactly one overview, so a second one would block it.
pub async fn create_overview(
    config: &Config,
    session: Arc<dyn RegistrySession>,
    replace_existing: bool,
    date: NaiveDate,
) -> Result<OverviewOutcome, OverviewError> {
    let writer = OverviewWriter::from_config(config);

    let removed = if replace_existing {
        writer.remove_existing()?
    } else if let Some(path) = writer.existing_overviews()?.into_iter().next() {
        return Err(OverviewError::AlreadyExists(path));
    } else {
        Vec::new()
    };

    let report = AgreementExtractor::new(session, config.extraction.clone())
        .extract()
        .await?;
    let artifacts = writer.write(&report, date)?;

    if !report.failures.is_empty() {
        warn!(
            skipped = report.failures.len(),
            visited = report.institutions_visited,
            "Overview is incomplete"
        );
    }

    Ok(OverviewOutcome {
        artifacts,
        report,
        removed,
    })
}

/// Enqueue the status changes entered in the overview artifact.
pub fn upload_queue(config: &Config, queue: Arc<dyn WorkQueue>) -> Result<UploadReport, UploadError> {
    let change_set = ChangeReader::from_config(config).read()?;
    QueueUploader::new(queue).upload(change_set)
}

/// Apply every queued status change to the registry.
pub async fn handle_queue(
    config: &Config,
    session: Arc<dyn RegistrySession>,
    queue: Arc<dyn WorkQueue>,
) -> Result<ProcessorSummary, ProcessorError> {
    QueueProcessor::new(ProcessorConfig::from_config(&config.queue), session, queue)
        .run()
        .await
}
