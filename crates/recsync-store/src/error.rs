//! Source store error types.

use std::path::PathBuf;

use recsync_types::csv::CsvError;

/// Errors produced by [`SourceStore`](crate::SourceStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The sheet backing a record type does not exist.
    #[error("sheet '{0}' not found")]
    SheetNotFound(String),

    /// A column the caller relies on is missing from the sheet header.
    #[error("sheet '{sheet}' has no column '{column}'")]
    MissingColumn { sheet: String, column: String },

    /// Reading or writing a sheet file failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sheet file is not valid CSV.
    #[error("malformed sheet {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: CsvError,
    },

    /// Internal mutex was poisoned by a panicked thread.
    #[error("source store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
