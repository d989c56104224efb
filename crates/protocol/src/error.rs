//! Error kinds shared across the supervisor, named after §7 of the design:
//! some are hard failures that abort a start, others are logged warnings
//! that degrade gracefully.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("X server binary '{command}' not found on PATH")]
    BinaryNotFound { command: String },

    #[error("failed to spawn X server process: {source}")]
    SpawnFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create authority directory {path}: {source}")]
    AuthorityDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write authority file {path}: {source}")]
    AuthorityWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to probe X server version: {reason}")]
    VersionProbeFailed { reason: String },
}
