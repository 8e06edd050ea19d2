// SPDX-License-Identifier: GPL-3.0-only
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::index::RemoteCatalog;
use crate::sync::error::SyncError;
use crate::utils::is_part_file;

/// Artifact file names with their size when known, kept in sorted order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    entries: BTreeMap<String, Option<u64>>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog(catalog: &RemoteCatalog) -> Self {
        let entries = catalog
            .iter()
            .map(|(_, entry)| (entry.filename.clone(), entry.size))
            .collect();
        Self { entries }
    }

    /// List the `.gem` files of a directory; a missing directory is empty
    pub async fn from_dir(dir: &Path) -> Result<Self, SyncError> {
        let fs_error = |source| SyncError::Filesystem {
            path: dir.to_path_buf(),
            source,
        };

        let mut listing = match tokio::fs::read_dir(dir).await {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(fs_error(e)),
        };

        let mut set = Self::new();
        while let Some(entry) = listing.next_entry().await.map_err(fs_error)? {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            if is_part_file(&name) || name.starts_with('.') || !name.ends_with(".gem") {
                continue;
            }
            let metadata = entry.metadata().await.map_err(fs_error)?;
            if !metadata.is_file() {
                continue;
            }
            set.insert(name, Some(metadata.len()));
        }

        debug!(dir = %dir.display(), count = set.len(), "Listed local artifacts");
        Ok(set)
    }

    pub fn insert(&mut self, name: impl Into<String>, size: Option<u64>) {
        self.entries.insert(name.into(), size);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn size_of(&self, name: &str) -> Option<u64> {
        self.entries.get(name).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let entries = iter.into_iter().map(|name| (name.into(), None)).collect();
        Self { entries }
    }
}

/// What one run has to fetch and delete, both in lexicographic order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_fetch: Vec<String>,
    pub to_delete: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_fetch.is_empty() && self.to_delete.is_empty()
    }
}

/// Plan a run from the remote catalog and the local listing
pub fn plan(
    catalog: &RemoteCatalog,
    local: &ArtifactSet,
    allow_empty_remote: bool,
) -> Result<SyncPlan, SyncError> {
    diff(&ArtifactSet::from_catalog(catalog), local, allow_empty_remote)
}

/// `to_fetch = remote - local` (plus same-named files whose known sizes
/// differ), `to_delete = local - remote`.
///
/// An empty remote set never deletes anything unless `allow_empty_remote`.
pub fn diff(
    remote: &ArtifactSet,
    local: &ArtifactSet,
    allow_empty_remote: bool,
) -> Result<SyncPlan, SyncError> {
    if remote.is_empty() && !local.is_empty() && !allow_empty_remote {
        return Err(SyncError::MassDeletionRefused {
            local_count: local.len(),
        });
    }

    let to_fetch: Vec<String> = remote
        .entries
        .iter()
        .filter(|(name, remote_size)| match local.entries.get(name.as_str()) {
            None => true,
            Some(local_size) => matches!((remote_size, local_size), (Some(r), Some(l)) if r != l),
        })
        .map(|(name, _)| name.clone())
        .collect();

    let to_delete: Vec<String> = local
        .names()
        .filter(|name| !remote.contains(name))
        .map(str::to_string)
        .collect();

    info!(
        remote = remote.len(),
        local = local.len(),
        to_fetch = to_fetch.len(),
        to_delete = to_delete.len(),
        "Planned sync"
    );
    Ok(SyncPlan { to_fetch, to_delete })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PackageId;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn set(names: &[&str]) -> ArtifactSet {
        names.iter().copied().collect()
    }

    #[test]
    fn test_fetch_and_delete_scenario() {
        let plan = diff(&set(&["a.gem", "b.gem"]), &set(&["b.gem", "c.gem"]), false).unwrap();
        assert_eq!(plan.to_fetch, vec!["a.gem"]);
        assert_eq!(plan.to_delete, vec!["c.gem"]);
    }

    #[test]
    fn test_every_artifact_classified_exactly_once() {
        let cases: [(&[&str], &[&str]); 5] = [
            (&["a.gem", "b.gem"], &["b.gem", "c.gem"]),
            (&["a.gem"], &[]),
            (&["a.gem", "b.gem"], &["a.gem", "b.gem"]),
            (&["x.gem", "y.gem", "z.gem"], &["a.gem", "m.gem", "y.gem"]),
            (&["only-remote.gem"], &["only-local.gem"]),
        ];

        for (remote, local) in cases {
            let plan = diff(&set(remote), &set(local), false).unwrap();
            let fetch: BTreeSet<&str> = plan.to_fetch.iter().map(String::as_str).collect();
            let delete: BTreeSet<&str> = plan.to_delete.iter().map(String::as_str).collect();
            let remote: BTreeSet<&str> = remote.iter().copied().collect();
            let local: BTreeSet<&str> = local.iter().copied().collect();
            let both: BTreeSet<&str> = remote.intersection(&local).copied().collect();

            assert!(fetch.is_disjoint(&delete));
            assert!(fetch.is_disjoint(&both));
            assert!(delete.is_disjoint(&both));
            let classified: BTreeSet<&str> = fetch.union(&delete).chain(both.iter()).copied().collect();
            let everything: BTreeSet<&str> = remote.union(&local).copied().collect();
            assert_eq!(classified, everything);
        }
    }

    #[test]
    fn test_empty_remote_refuses_mass_deletion() {
        let result = diff(&ArtifactSet::new(), &set(&["a.gem", "b.gem"]), false);
        assert!(matches!(result, Err(SyncError::MassDeletionRefused { local_count: 2 })));
    }

    #[test]
    fn test_empty_remote_with_confirmation() {
        let plan = diff(&ArtifactSet::new(), &set(&["a.gem"]), true).unwrap();
        assert_eq!(plan.to_delete, vec!["a.gem"]);
    }

    #[test]
    fn test_empty_remote_and_local_is_trivial() {
        let plan = diff(&ArtifactSet::new(), &ArtifactSet::new(), false).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_is_sorted_and_deterministic() {
        let remote = set(&["zeitwerk-2.6.12.gem", "activesupport-7.1.2.gem", "minitest-5.20.0.gem"]);
        let first = diff(&remote, &ArtifactSet::new(), false).unwrap();
        let second = diff(&remote, &ArtifactSet::new(), false).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.to_fetch,
            vec!["activesupport-7.1.2.gem", "minitest-5.20.0.gem", "zeitwerk-2.6.12.gem"]
        );
    }

    #[test]
    fn test_size_mismatch_refetches_only_when_both_known() {
        let mut remote = ArtifactSet::new();
        remote.insert("a.gem", Some(100));
        remote.insert("b.gem", Some(200));
        remote.insert("c.gem", None);
        let mut local = ArtifactSet::new();
        local.insert("a.gem", Some(100));
        local.insert("b.gem", Some(150));
        local.insert("c.gem", Some(1));

        let plan = diff(&remote, &local, false).unwrap();
        assert_eq!(plan.to_fetch, vec!["b.gem"]);
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_plan_from_catalog() {
        let mut catalog = RemoteCatalog::new();
        catalog.insert(PackageId::new("rake", "13.0.6", "ruby"), None, None).unwrap();
        catalog.insert(PackageId::new("ffi", "1.16.3", "java"), None, None).unwrap();

        let plan = plan(&catalog, &set(&["rake-13.0.6.gem", "old-0.1.gem"]), false).unwrap();
        assert_eq!(plan.to_fetch, vec!["ffi-1.16.3-java.gem"]);
        assert_eq!(plan.to_delete, vec!["old-0.1.gem"]);
    }

    #[tokio::test]
    async fn test_from_dir_lists_only_finished_gems() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        std::fs::write(dir.join("rake-13.0.6.gem"), "12345").unwrap();
        std::fs::write(dir.join(".rake-13.0.7.gem.1234.part"), "partial").unwrap();
        std::fs::write(dir.join("README"), "not a gem").unwrap();
        std::fs::create_dir(dir.join("nested.gem")).unwrap();

        let set = ArtifactSet::from_dir(dir).await.unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["rake-13.0.6.gem"]);
        assert_eq!(set.size_of("rake-13.0.6.gem"), Some(5));
    }

    #[tokio::test]
    async fn test_from_dir_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let set = ArtifactSet::from_dir(&temp_dir.path().join("gems")).await.unwrap();
        assert!(set.is_empty());
    }
}
