//! Overview artifact and error log writer.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;

use super::{is_overview_file, ExtractionReport, OverviewError, OverviewRow};

/// Files produced by one overview run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewArtifacts {
    pub overview: PathBuf,
    pub rows: usize,
    /// Written only when some organisations were skipped.
    pub error_log: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorLogRow<'a> {
    #[serde(rename = "Instregnr")]
    institution_id: &'a str,
    #[serde(rename = "Organisation")]
    organisation: &'a str,
    #[serde(rename = "Institutionsnavn")]
    institution_name: &'a str,
    #[serde(rename = "Forsøg")]
    attempts: u32,
    #[serde(rename = "Fejl")]
    message: &'a str,
}

/// Writes the overview artifact into the output directory.
///
/// Writing never replaces an existing file; prior artifacts are removed only
/// through [`OverviewWriter::remove_existing`].
pub struct OverviewWriter {
    output_dir: PathBuf,
    delimiter: u8,
}

impl OverviewWriter {
    pub fn new(output_dir: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            output_dir: output_dir.into(),
            delimiter,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let delimiter = u8::try_from(config.overview.delimiter).unwrap_or(b';');
        Self::new(config.output_dir(), delimiter)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `Dataaftaler_Oversigt_<ddmmyyyy>.csv`
    pub fn overview_path(&self, date: NaiveDate) -> PathBuf {
        self.output_dir
            .join(format!("Dataaftaler_Oversigt_{}.csv", date.format("%d%m%Y")))
    }

    /// `Error_Log_<ddmmyyyy>.csv`
    pub fn error_log_path(&self, date: NaiveDate) -> PathBuf {
        self.output_dir
            .join(format!("Error_Log_{}.csv", date.format("%d%m%Y")))
    }

    /// Overview artifacts of any date in the output directory, sorted.
    pub fn existing_overviews(&self) -> Result<Vec<PathBuf>, OverviewError> {
        let mut found = Vec::new();

        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(io_error(&self.output_dir, e)),
        };

        for entry in entries {
            let path = entry.map_err(|e| io_error(&self.output_dir, e))?.path();
            let is_overview = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_overview_file);

            if is_overview && path.is_file() {
                found.push(path);
            }
        }

        found.sort();
        Ok(found)
    }

    /// Delete every overview artifact in the output directory.
    pub fn remove_existing(&self) -> Result<Vec<PathBuf>, OverviewError> {
        let removed = self.existing_overviews()?;
        for path in &removed {
            fs::remove_file(path).map_err(|e| io_error(path, e))?;
            warn!(path = %path.display(), "Removed previous overview");
        }
        Ok(removed)
    }

    /// Write the overview for `report`, plus the error log if any
    /// organisation was skipped.
    pub fn write(
        &self,
        report: &ExtractionReport,
        date: NaiveDate,
    ) -> Result<OverviewArtifacts, OverviewError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| io_error(&self.output_dir, e))?;

        let mut rows: Vec<OverviewRow> = report.agreements.iter().map(OverviewRow::from).collect();
        rows.sort_by(|a, b| {
            a.institution_id
                .cmp(&b.institution_id)
                .then_with(|| a.agreement_id.cmp(&b.agreement_id))
        });

        let overview = self.overview_path(date);
        let mut writer = self.csv_writer(&overview)?;
        if rows.is_empty() {
            // serde only emits the header with the first record
            writer.write_record(OVERVIEW_HEADERS)?;
        }
        for row in &rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(|e| io_error(&overview, e))?;

        info!(path = %overview.display(), rows = rows.len(), "Overview written");

        let error_log = if report.failures.is_empty() {
            None
        } else {
            Some(self.write_error_log(report, date)?)
        };

        Ok(OverviewArtifacts {
            overview,
            rows: rows.len(),
            error_log,
        })
    }

    fn write_error_log(
        &self,
        report: &ExtractionReport,
        date: NaiveDate,
    ) -> Result<PathBuf, OverviewError> {
        // A same-day rerun replaces the previous log
        let path = self.error_log_path(date);
        let file = File::create(&path).map_err(|e| io_error(&path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(file);

        for failure in &report.failures {
            writer.serialize(ErrorLogRow {
                institution_id: &failure.institution.id,
                organisation: failure.institution.kind.label(),
                institution_name: &failure.name,
                attempts: failure.attempts,
                message: &failure.message,
            })?;
        }
        writer.flush().map_err(|e| io_error(&path, e))?;

        warn!(
            path = %path.display(),
            skipped = report.failures.len(),
            "Some institutions were skipped, see error log"
        );

        Ok(path)
    }

    fn csv_writer(&self, path: &Path) -> Result<csv::Writer<File>, OverviewError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    OverviewError::AlreadyExists(path.to_path_buf())
                } else {
                    io_error(path, e)
                }
            })?;

        Ok(csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(file))
    }
}

const OVERVIEW_HEADERS: [&str; 8] = [
    "Instregnr",
    "Organisation",
    "Institutionsnavn",
    "aftaleId",
    "systemNavn",
    "serviceNavn",
    "status",
    "statusændring",
];

fn io_error(path: &Path, source: io::Error) -> OverviewError {
    OverviewError::Io {
        path: path.to_path_buf(),
        source,
    }
}
