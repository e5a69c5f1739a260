//! Bulk dispatch error types.

use std::path::PathBuf;

use recsync_types::csv::CsvError;

/// Job-level failures raised while talking to the bulk API.
///
/// Any of these aborts the current record type's run but never the
/// orchestration.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The integration tool could not be started.
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited unsuccessfully without a recoverable payload.
    #[error("bulk command failed: {0}")]
    CommandFailed(String),

    /// A single tool invocation exceeded its own timeout.
    #[error("bulk command timed out after {secs}s")]
    CommandTimeout { secs: u64 },

    /// The tool's response could not be interpreted.
    #[error("malformed bulk response: {0}")]
    MalformedResponse(String),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed result file {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: CsvError,
    },
}

impl DispatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
