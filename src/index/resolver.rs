// SPDX-License-Identifier: GPL-3.0-only
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::index::catalog::RemoteCatalog;
use crate::index::format::decode_index;
use crate::layout::{Layout, PRERELEASE_SPECS_INDEX, SPECS_INDEX};
use crate::sync::error::SyncError;
use crate::transport::{FetchStatus, Transport};
use crate::utils::{stage_copy, write_atomic};

/// Downloads the remote index into the mirror and decodes it
pub struct IndexResolver {
    transport: Arc<dyn Transport>,
    layout: Layout,
}

impl IndexResolver {
    pub fn new(transport: Arc<dyn Transport>, layout: Layout) -> Self {
        Self { transport, layout }
    }

    pub async fn resolve(&self, include_prerelease: bool) -> Result<RemoteCatalog, SyncError> {
        let mut catalog = self.resolve_file(SPECS_INDEX).await?;
        if include_prerelease {
            catalog.merge(self.resolve_file(PRERELEASE_SPECS_INDEX).await?);
        }

        info!(packages = catalog.len(), "Resolved remote index");
        Ok(catalog)
    }

    /// Fetch one index file, decode it, and keep a decompressed copy next to it.
    ///
    /// The download lands in a staging sibling and only replaces the mirrored
    /// index once it decodes, so a bad response never overwrites a good index.
    pub async fn resolve_file(&self, file: &str) -> Result<RemoteCatalog, SyncError> {
        let path = self.layout.local(file);
        let staging = stage_copy(&path).await.map_err(filesystem_error(&path))?;

        let result = self.fetch_staged(file, &path, &staging).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&staging).await;
        }
        result
    }

    async fn fetch_staged(&self, file: &str, path: &Path, staging: &Path) -> Result<RemoteCatalog, SyncError> {
        let url = self.layout.remote(file);
        info!(url = %url, "Fetching index");
        let status = self
            .transport
            .fetch(&url, staging)
            .await
            .map_err(|source| SyncError::IndexUnavailable {
                file: file.to_string(),
                source,
            })?;
        if status == FetchStatus::NotModified {
            info!(file = %file, "Index unchanged, using local copy");
        }

        let data = tokio::fs::read(staging).await.map_err(filesystem_error(staging))?;
        let (catalog, payload) = decode_index(&data).map_err(|source| {
            warn!(file = %file, error = %source, "Rejected index, keeping previous copy");
            SyncError::CorruptIndex {
                file: file.to_string(),
                source,
            }
        })?;

        tokio::fs::rename(staging, path).await.map_err(filesystem_error(path))?;
        if let Some(plain) = file.strip_suffix(".gz") {
            let plain_path = self.layout.local(plain);
            write_atomic(&plain_path, &payload).await.map_err(filesystem_error(&plain_path))?;
        }

        info!(file = %file, packages = catalog.len(), "Decoded index");
        Ok(catalog)
    }
}

fn filesystem_error(path: &Path) -> impl FnOnce(std::io::Error) -> SyncError + use<> {
    let path = path.to_path_buf();
    move |source| SyncError::Filesystem { path, source }
}
