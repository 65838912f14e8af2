//! Locating and parsing the annotated overview.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::overview::{is_overview_file, OverviewRow};
use crate::queue::ElementData;
use crate::registry::{AgreementStatus, InstitutionKind, InstitutionRef, TargetStatus};

use super::UploadError;

/// A row whose status change cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRow {
    /// Line in the artifact, counting the header as line 1.
    pub row: usize,
    pub agreement_id: String,
    pub message: String,
}

impl fmt::Display for InvalidRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} (aftaleId {:?}): {}",
            self.row, self.agreement_id, self.message
        )
    }
}

/// Requested changes read from one overview artifact.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub source: PathBuf,
    pub rows_read: usize,
    /// One entry per row with a status change, in file order.
    pub changes: Vec<ElementData>,
    /// Rows whose agreement already has the requested status.
    pub unchanged: Vec<ElementData>,
}

/// Reads the status changes the operator entered in the overview.
pub struct ChangeReader {
    input_dir: PathBuf,
    delimiter: u8,
}

impl ChangeReader {
    pub fn new(input_dir: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            input_dir: input_dir.into(),
            delimiter,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let delimiter = u8::try_from(config.overview.delimiter).unwrap_or(b';');
        Self::new(config.output_dir(), delimiter)
    }

    /// Locate the single overview artifact in the input directory.
    pub fn locate(&self) -> Result<PathBuf, UploadError> {
        let entries = match fs::read_dir(&self.input_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(UploadError::NoOverviewFile(self.input_dir.clone()));
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| self.io_error(e))?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_overview_file);
            if matches && path.is_file() {
                candidates.push(path);
            }
        }
        candidates.sort();

        match candidates.len() {
            0 => Err(UploadError::NoOverviewFile(self.input_dir.clone())),
            1 => Ok(candidates.remove(0)),
            _ => Err(UploadError::MultipleOverviewFiles(candidates)),
        }
    }

    /// Locate and parse the overview artifact.
    pub fn read(&self) -> Result<ChangeSet, UploadError> {
        let path = self.locate()?;
        self.read_file(&path)
    }

    /// Parse one overview artifact.
    ///
    /// Every row with a non-empty status change must hold one of the exact
    /// tokens `VENTER`, `GODKEND` or `SLET`. All offending rows are reported
    /// together. A change to the status the agreement already has is set
    /// aside as unchanged.
    pub fn read_file(&self, path: &Path) -> Result<ChangeSet, UploadError> {
        info!(path = %path.display(), "Reading status changes");

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| parse_error(path, e))?;

        let mut rows_read = 0;
        let mut changes = Vec::new();
        let mut unchanged = Vec::new();
        let mut invalid = Vec::new();

        for (index, result) in reader.deserialize::<OverviewRow>().enumerate() {
            let row_number = index + 2;
            let row = result.map_err(|e| parse_error(path, e))?;
            rows_read += 1;

            if row.status_change.is_empty() {
                continue;
            }

            match to_change(&row) {
                Ok(data) if data.current_status == data.requested_status.resulting_status() => {
                    debug!(
                        row = row_number,
                        agreement_id = %data.agreement_id,
                        status = %data.current_status,
                        "Agreement already has the requested status"
                    );
                    unchanged.push(data);
                }
                Ok(data) => changes.push(data),
                Err(message) => invalid.push(InvalidRow {
                    row: row_number,
                    agreement_id: row.agreement_id.clone(),
                    message,
                }),
            }
        }

        if !invalid.is_empty() {
            return Err(UploadError::InvalidStatusChanges(invalid));
        }

        debug!(
            rows = rows_read,
            changes = changes.len(),
            unchanged = unchanged.len(),
            "Parsed overview"
        );

        Ok(ChangeSet {
            source: path.to_path_buf(),
            rows_read,
            changes,
            unchanged,
        })
    }

    fn io_error(&self, source: io::Error) -> UploadError {
        UploadError::Io {
            path: self.input_dir.clone(),
            source,
        }
    }
}

fn to_change(row: &OverviewRow) -> Result<ElementData, String> {
    let target = TargetStatus::from_token(&row.status_change).ok_or_else(|| {
        format!(
            "unrecognized status change {:?} (expected VENTER, GODKEND or SLET)",
            row.status_change
        )
    })?;

    let kind = InstitutionKind::from_label(&row.organisation)
        .ok_or_else(|| format!("unknown organisation type {:?}", row.organisation))?;

    if row.agreement_id.is_empty() {
        return Err("missing aftaleId".to_string());
    }
    if row.institution_id.is_empty() {
        return Err("missing Instregnr".to_string());
    }

    Ok(ElementData {
        agreement_id: row.agreement_id.clone(),
        institution: InstitutionRef::new(kind, row.institution_id.clone()),
        system_name: row.system_name.clone(),
        service_name: row.service_name.clone(),
        current_status: AgreementStatus::from(row.status.as_str()),
        requested_status: target,
    })
}

fn parse_error(path: &Path, source: csv::Error) -> UploadError {
    UploadError::Parse {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Instregnr;Organisation;Institutionsnavn;aftaleId;systemNavn;serviceNavn;status;statusændring";

    fn write_overview(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut content = String::from(HEADER);
        for row in rows {
            content.push('\n');
            content.push_str(row);
        }
        content.push('\n');
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reads_only_rows_with_changes() {
        let dir = tempfile::tempdir().unwrap();
        write_overview(
            dir.path(),
            "Dataaftaler_Oversigt_19102026.csv",
            &[
                "751001;Institutioner;Aarhus Skole;A1;Aula;Elevdata;GODKENDT;SLET",
                "751002;Institutioner;Aarhus Gymnasium;A2;Aula;Elevdata;VENTER;",
                "D1003;Dagtilbud;Solsikken;A3;Aula;Elevdata;VENTER;GODKEND",
            ],
        );

        let change_set = ChangeReader::new(dir.path(), b';').read().unwrap();
        assert_eq!(change_set.rows_read, 3);
        assert_eq!(change_set.changes.len(), 2);
        assert!(change_set.unchanged.is_empty());

        let first = &change_set.changes[0];
        assert_eq!(first.agreement_id, "A1");
        assert_eq!(first.requested_status, TargetStatus::Delete);
        assert_eq!(first.current_status, AgreementStatus::Approved);
        assert_eq!(first.institution.id, "751001");

        let second = &change_set.changes[1];
        assert_eq!(second.agreement_id, "A3");
        assert_eq!(second.requested_status, TargetStatus::Approve);
        assert_eq!(second.institution.kind, InstitutionKind::Daycare);
    }

    #[test]
    fn test_rows_already_in_target_status_are_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        write_overview(
            dir.path(),
            "Oversigt.csv",
            &[
                "751001;Institutioner;Skole;A1;Aula;Elevdata;GODKENDT;GODKEND",
                "751001;Institutioner;Skole;A2;Aula;Elevdata;VENTER;VENTER",
                "751001;Institutioner;Skole;A3;Aula;Elevdata;VENTER;GODKEND",
            ],
        );

        let change_set = ChangeReader::new(dir.path(), b';').read().unwrap();
        assert_eq!(change_set.rows_read, 3);
        assert_eq!(change_set.changes.len(), 1);
        assert_eq!(change_set.changes[0].agreement_id, "A3");

        let ids: Vec<&str> = change_set
            .unchanged
            .iter()
            .map(|d| d.agreement_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A1", "A2"]);
        assert_eq!(change_set.unchanged[1].current_status, AgreementStatus::Pending);
    }

    #[test]
    fn test_tokens_are_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        write_overview(
            dir.path(),
            "Oversigt.csv",
            &["751001;Institutioner;Skole;A1;Aula;Elevdata;GODKENDT;  VENTER "],
        );

        let change_set = ChangeReader::new(dir.path(), b';').read().unwrap();
        assert_eq!(change_set.changes[0].requested_status, TargetStatus::Await);
    }

    #[test]
    fn test_unrecognized_tokens_are_all_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_overview(
            dir.path(),
            "Oversigt.csv",
            &[
                "751001;Institutioner;Skole;A1;Aula;Elevdata;GODKENDT;SLET",
                "751001;Institutioner;Skole;A2;Aula;Elevdata;GODKENDT;MAYBE",
                "751001;Institutioner;Skole;A3;Aula;Elevdata;GODKENDT;slet",
            ],
        );

        let err = ChangeReader::new(dir.path(), b';').read().unwrap_err();
        match err {
            UploadError::InvalidStatusChanges(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].row, 3);
                assert_eq!(rows[0].agreement_id, "A2");
                assert!(rows[0].message.contains("\"MAYBE\""));
                assert_eq!(rows[1].row, 4);
            }
            other => panic!("Expected InvalidStatusChanges, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_organisation_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_overview(
            dir.path(),
            "Oversigt.csv",
            &["751001;Skoler;Skole;A1;Aula;Elevdata;GODKENDT;SLET"],
        );

        let err = ChangeReader::new(dir.path(), b';').read().unwrap_err();
        assert!(matches!(err, UploadError::InvalidStatusChanges(ref rows) if rows.len() == 1));
    }

    #[test]
    fn test_no_overview_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Error_Log_19102026.csv"), "x").unwrap();

        let err = ChangeReader::new(dir.path(), b';').locate().unwrap_err();
        assert!(matches!(err, UploadError::NoOverviewFile(_)));
    }

    #[test]
    fn test_missing_input_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChangeReader::new(dir.path().join("Output"), b';')
            .locate()
            .unwrap_err();
        assert!(matches!(err, UploadError::NoOverviewFile(_)));
    }

    #[test]
    fn test_multiple_overview_files() {
        let dir = tempfile::tempdir().unwrap();
        write_overview(dir.path(), "Dataaftaler_Oversigt_01102026.csv", &[]);
        write_overview(dir.path(), "Dataaftaler_Oversigt_19102026.csv", &[]);

        let err = ChangeReader::new(dir.path(), b';').locate().unwrap_err();
        match err {
            UploadError::MultipleOverviewFiles(paths) => assert_eq!(paths.len(), 2),
            other => panic!("Expected MultipleOverviewFiles, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_change_column_means_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Oversigt.csv");
        fs::write(
            &path,
            "Instregnr;Organisation;aftaleId;status\n751001;Institutioner;A1;GODKENDT\n",
        )
        .unwrap();

        let change_set = ChangeReader::new(dir.path(), b';').read().unwrap();
        assert_eq!(change_set.rows_read, 1);
        assert!(change_set.changes.is_empty());
    }

    #[test]
    fn test_invalid_row_display() {
        let row = InvalidRow {
            row: 7,
            agreement_id: "4711".to_string(),
            message: "missing Instregnr".to_string(),
        };
        assert_eq!(row.to_string(), "row 7 (aftaleId \"4711\"): missing Instregnr");
    }
}
