//! Error types for forge-git

use std::path::PathBuf;

/// Result type for forge-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in forge-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Unable to open repository at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("Unable to initialise repository at {path}: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Repository at {path} has no working tree")]
    NoWorkingTree { path: PathBuf },

    #[error("Invalid file name: {name:?}")]
    InvalidFileName { name: String },

    #[error("Invalid branch name: {name}")]
    InvalidBranchName { name: String },

    #[error("Branch '{name}' already exists")]
    BranchExists { name: String },

    #[error("Unable to stage {file}: {source}")]
    Stage {
        file: String,
        #[source]
        source: git2::Error,
    },

    #[error("Unable to commit {file}: {source}")]
    Commit {
        file: String,
        #[source]
        source: git2::Error,
    },

    #[error("Pull failed: {message}")]
    PullFailed { message: String },

    #[error("Push failed: {message}")]
    PushFailed { message: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
