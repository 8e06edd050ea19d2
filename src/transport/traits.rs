// SPDX-License-Identifier: GPL-3.0-only
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result of a successful retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// New content was written to the destination
    Downloaded { bytes: u64 },

    /// The remote copy has not changed since the local file was written
    NotModified,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Http { status, .. } => *status >= 500,
            TransportError::NotFound { .. } | TransportError::Write { .. } => false,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Copy the bytes at `url` into `destination`.
    ///
    /// The destination is replaced atomically; on failure it is left untouched.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<FetchStatus, TransportError>;
}
