use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot target is a directory, not a file: {0}")]
    DirectoryTarget(PathBuf),

    #[error("snapshot copy missing for {original}: {snapshot}")]
    MissingSnapshotCopy { original: PathBuf, snapshot: String },

    #[error("failed to {action} {path}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to {action} snapshot manifest {path}")]
    Manifest {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SnapshotError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::Write {
            path: path.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("duplicate step id '{0}' in stage plan")]
    DuplicateStepId(String),
}
