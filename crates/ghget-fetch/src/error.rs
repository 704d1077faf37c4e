//! Error types for ghget-fetch.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::rate::RateLimitError;

pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed response from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    pub(crate) fn network<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FetchError::Network(Box::new(err))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FetchError::Io {
            path: path.into(),
            source,
        }
    }

    /// The rate-limit payload, if this is a rate-limit failure.
    pub fn rate_limit(&self) -> Option<&RateLimitError> {
        match self {
            FetchError::RateLimited(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
