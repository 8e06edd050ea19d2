// SPDX-License-Identifier: GPL-3.0-only
use std::path::PathBuf;

use crate::index::IndexError;
use crate::transport::TransportError;

/// Failures that stop a mirror run before any task is executed
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("Index {file} unavailable: {source}")]
    IndexUnavailable {
        file: String,
        #[source]
        source: TransportError,
    },

    #[error("Corrupt index {file}: {source}")]
    CorruptIndex {
        file: String,
        #[source]
        source: IndexError,
    },

    #[error("Refusing to delete all {local_count} local gems: the remote index lists no packages")]
    MassDeletionRefused { local_count: usize },

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
