//! Error types for weaver-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration loading and saving.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error on load, with the config file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (save path).
    #[error("config serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// `std::env::current_dir()` failed; no base for default paths.
    #[error("cannot determine current directory: {0}")]
    CurrentDirUnavailable(#[source] std::io::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
