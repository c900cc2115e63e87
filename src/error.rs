use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
/// Map-reduce error
///
/// Every variant is fatal: a run never retries, skips or partially recovers.
/// The `Io` and `Format` variants carry enough context (path, line number) to
/// diagnose the failing input or output.
pub enum MapReduceError {
    /// Missing or invalid engine configuration: no source, missing mapper or
    /// reducer, a grouping field absent from a mapped record, or a sink used
    /// after it was closed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A source could not be opened or read, or a destination could not be
    /// created or written.
    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed input: unterminated quoted field, empty header line on a
    /// non-empty stream, or a field count that does not match the header.
    #[error("format error in '{}' at line {line}: {message}", path.display())]
    Format {
        path: PathBuf,
        line: u64,
        message: String,
    },
}

impl MapReduceError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        MapReduceError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn format(path: impl AsRef<Path>, line: u64, message: impl Into<String>) -> Self {
        MapReduceError::Format {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }
}
