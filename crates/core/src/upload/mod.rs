//! Stage 2: turn the operator's annotated overview into queue elements.

mod reader;
mod uploader;

pub use reader::{ChangeReader, ChangeSet, InvalidRow};
pub use uploader::{QueueUploader, UploadReport};

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::queue::QueueError;

/// Errors that end the upload stage. None of them leave partial queue writes.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No overview file found in {}", .0.display())]
    NoOverviewFile(PathBuf),

    #[error("Expected exactly one overview file, found {}: {}", .0.len(), DisplayPaths(.0))]
    MultipleOverviewFiles(Vec<PathBuf>),

    #[error("{} row(s) have an invalid status change:\n{}", .0.len(), DisplayRows(.0))]
    InvalidStatusChanges(Vec<InvalidRow>),

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to enqueue changes: {0}")]
    Queue(#[from] QueueError),
}

struct DisplayPaths<'a>(&'a [PathBuf]);

impl fmt::Display for DisplayPaths<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

struct DisplayRows<'a>(&'a [InvalidRow]);

impl fmt::Display for DisplayRows<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "  {}", row)?;
        }
        Ok(())
    }
}
