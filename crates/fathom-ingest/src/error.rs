//! Ingestion error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while loading telemetry captures.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error reading telemetry: {0}")]
    Io(#[from] std::io::Error),

    /// A capture file exists but one of its rows does not parse.
    #[error("{}:{}: {}", path.display(), line, message)]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A cell is missing one of its two capture files.
    #[error("missing capture file: {}", .0.display())]
    MissingFile(PathBuf),
}
