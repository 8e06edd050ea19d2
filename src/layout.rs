// SPDX-License-Identifier: GPL-3.0-only
//! Relative paths of a gem repository, identical on the remote and the mirror.

use std::path::PathBuf;

use crate::utils::join_url;

/// Current full index (Marshal 4.8, gzipped)
pub const SPECS_INDEX: &str = "specs.4.8.gz";

/// Prerelease index, same format as [`SPECS_INDEX`]
pub const PRERELEASE_SPECS_INDEX: &str = "prerelease_specs.4.8.gz";

/// Directory holding `.gem` artifacts
pub const GEMS_DIR: &str = "gems";

/// Directory holding per-gem specification files
pub const GEMSPECS_DIR: &str = "quick/Marshal.4.8";

/// Files a client expects at fixed locations besides the full index
pub const BASE_FILES: [&str; 5] = [
    "latest_specs.4.8.gz",
    "Marshal.4.8.Z",
    "yaml",
    "quick/latest_index.rz",
    "prerelease_specs.4.8.gz",
];

#[derive(Debug, Clone)]
pub struct Layout {
    source: String,
    destination: PathBuf,
}

impl Layout {
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }


    /// URL of a relative path on the remote
    pub fn remote(&self, relative: &str) -> String {
        join_url(&self.source, relative)
    }

    /// Location of a relative path inside the mirror
    pub fn local(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.destination.clone(), |path, segment| path.join(segment))
    }

    pub fn gems_dir(&self) -> PathBuf {
        self.local(GEMS_DIR)
    }
}

/// `gems/<artifact>`
pub fn gem_path(artifact: &str) -> String {
    format!("{}/{}", GEMS_DIR, artifact)
}

/// `quick/Marshal.4.8/<name-version[-platform]>.gemspec.rz`
pub fn gemspec_path(artifact: &str) -> String {
    let stem = artifact.strip_suffix(".gem").unwrap_or(artifact);
    format!("{}/{}.gemspec.rz", GEMSPECS_DIR, stem)
}
