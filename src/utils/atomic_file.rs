// SPDX-License-Identifier: GPL-3.0-only
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Prefix shared by every in-progress file, so listings can skip them
pub const PART_PREFIX: &str = ".";

/// Suffix shared by every in-progress file
pub const PART_SUFFIX: &str = ".part";

/// A file being written next to its final destination.
///
/// Content goes to a hidden sibling and only replaces the destination on
/// [`PartFile::commit`]. Dropping an uncommitted `PartFile` removes the sibling.
pub struct PartFile {
    temp_path: PathBuf,
    destination: PathBuf,
    file: Option<File>,
    written: u64,
}

impl PartFile {
    pub async fn create(destination: &Path) -> io::Result<Self> {
        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;
        let temp_path = parent.join(format!("{}{}.{}{}", PART_PREFIX, name, Uuid::new_v4(), PART_SUFFIX));

        let file = File::create(&temp_path).await?;

        Ok(Self {
            temp_path,
            destination: destination.to_path_buf(),
            file: Some(file),
            written: 0,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush, optionally stamp the modification time, then rename into place.
    pub async fn commit(mut self, modified: Option<SystemTime>) -> io::Result<u64> {
        let mut file = self.file.take().ok_or_else(closed)?;
        file.flush().await?;
        let file = file.into_std().await;

        let temp_path = self.temp_path.clone();
        let destination = self.destination.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(modified) = modified {
                file.set_modified(modified)?;
            }
            file.sync_all()?;
            drop(file);
            std::fs::rename(&temp_path, &destination)
        })
        .await
        .map_err(io::Error::other)??;

        // Renamed away, nothing left for Drop to clean up
        self.temp_path = PathBuf::new();
        Ok(self.written)
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.temp_path.as_os_str().is_empty() {
            self.file.take();
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "part file already closed")
}

/// Whether a directory entry name belongs to an in-progress write
pub fn is_part_file(name: &str) -> bool {
    name.starts_with(PART_PREFIX) && name.ends_with(PART_SUFFIX)
}

/// Write a whole buffer atomically
pub async fn write_atomic(destination: &Path, contents: &[u8]) -> io::Result<()> {
    let mut part = PartFile::create(destination).await?;
    part.write(contents).await?;
    part.commit(None).await?;
    Ok(())
}

/// Hidden sibling used to fetch and check a file before it replaces `destination`.
///
/// When `destination` exists it is copied over with its modification time, so
/// conditional requests against the staging path behave like against the original.
pub async fn stage_copy(destination: &Path) -> io::Result<PathBuf> {
    let name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;
    let staging = destination.with_file_name(format!("{}{}.staging{}", PART_PREFIX, name, PART_SUFFIX));

    let source = destination.to_path_buf();
    let target = staging.clone();
    tokio::task::spawn_blocking(move || {
        let modified = match std::fs::metadata(&source) {
            Ok(metadata) => metadata.modified()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return match std::fs::remove_file(&target) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                    _ => Ok(()),
                };
            }
            Err(e) => return Err(e),
        };
        std::fs::copy(&source, &target)?;
        std::fs::File::options().write(true).open(&target)?.set_modified(modified)
    })
    .await
    .map_err(io::Error::other)??;

    Ok(staging)
}
