//! Errors shared by the persisted configuration document and the run log.

use std::path::PathBuf;
use thiserror::Error;

/// Failure against durable storage, distinguished from "absent, use default"
/// which the stores handle internally.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
