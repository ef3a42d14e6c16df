use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures while provisioning or loading a word-vector model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown model id '{0}'")]
    UnknownModel(String),

    #[error("model file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("fetching {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed vectors file {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ModelError {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        ModelError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        ModelError::Malformed {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn fetch(url: &str, source: reqwest::Error) -> Self {
        ModelError::Fetch {
            url: url.to_string(),
            source,
        }
    }
}

/// Failures while ranking candidate names against a query word.
///
/// A missing names file gets its own variant so callers can decide
/// whether it is fatal; library code never exits the process.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("names file not found: {}", .path.display())]
    NamesNotFound { path: PathBuf },

    #[error("could not read names file {}: {source}", .path.display())]
    NamesIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{0}' is not in the model vocabulary")]
    UnknownWord(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}
