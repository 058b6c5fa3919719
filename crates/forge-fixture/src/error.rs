//! Error types for forge-fixture

use std::path::PathBuf;

/// Result type for forge-fixture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in forge-fixture operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded { operation: String },

    #[error("Unable to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Unable to start container: {message}")]
    ContainerStart { message: String },

    #[error("Unable to get port of {port}: {message}")]
    PortResolution { port: String, message: String },

    #[error("Unable to create new user '{username}', response was: {response:?}")]
    CreateUser { username: String, response: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Unable to {operation}: {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unable to {operation}: server returned {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{remaining} public key(s) still present after {rounds} removal rounds")]
    PublicKeysRemain { remaining: usize, rounds: usize },

    #[error("Key error: {0}")]
    Keys(#[from] forge_keys::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step}: {source}")]
    Preparation {
        step: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap `self` with the name of the preparation step that failed.
    pub fn at_step(self, step: impl Into<String>) -> Self {
        Self::Preparation {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// HTTP status of a failed API call, if this is one.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Preparation { source, .. } => source.api_status(),
            _ => None,
        }
    }
}
