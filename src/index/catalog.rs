// SPDX-License-Identifier: GPL-3.0-only
use std::collections::BTreeMap;
use std::fmt;

use crate::index::error::IndexError;
use crate::index::marshal::Value;
use crate::utils::path_sanitizer::validate_artifact_name;

/// Platform string of pure-Ruby gems
pub const GENERIC_PLATFORM: &str = "ruby";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    pub name: String,
    pub version: String,
    pub platform: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            platform: platform.into(),
        }
    }

    /// `name-version`, plus `-platform` unless the gem is pure Ruby
    pub fn full_name(&self) -> String {
        if self.platform == GENERIC_PLATFORM || self.platform.is_empty() {
            format!("{}-{}", self.name, self.version)
        } else {
            format!("{}-{}-{}", self.name, self.version, self.platform)
        }
    }

    pub fn artifact_filename(&self) -> String {
        format!("{}.gem", self.full_name())
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub filename: String,
    pub size: Option<u64>,
    pub checksum: Option<String>,
}

/// Every package the remote index advertises
#[derive(Debug, Clone, Default)]
pub struct RemoteCatalog {
    entries: BTreeMap<PackageId, CatalogEntry>,
}

impl RemoteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a decoded `specs` array of `[name, version, platform]`
    pub fn from_marshal(value: Value) -> Result<Self, IndexError> {
        let Value::Array(items) = value else {
            return Err(IndexError::BadEntry {
                index: 0,
                reason: "index root is not an array".to_string(),
            });
        };

        let mut catalog = Self::new();
        for (index, item) in items.into_iter().enumerate() {
            let bad = |reason: &str| IndexError::BadEntry {
                index,
                reason: reason.to_string(),
            };

            let Value::Array(fields) = item else {
                return Err(bad("entry is not an array"));
            };
            let [name, version, platform]: [Value; 3] = fields
                .try_into()
                .map_err(|_| bad("entry does not have three fields"))?;

            let name = name.as_str().ok_or_else(|| bad("name is not a string"))?;
            let version = version_string(&version).ok_or_else(|| bad("unrecognized version"))?;
            let platform = platform.as_str().ok_or_else(|| bad("platform is not a string"))?;

            let id = PackageId::new(name, version, platform);
            catalog.insert(id, None, None).map_err(|e| bad(&e.to_string()))?;
        }
        Ok(catalog)
    }

    /// Add a package, checking that its artifact name is a plain file name
    pub fn insert(
        &mut self,
        id: PackageId,
        size: Option<u64>,
        checksum: Option<String>,
    ) -> Result<(), crate::utils::path_sanitizer::UnsafeName> {
        let filename = id.artifact_filename();
        validate_artifact_name(&filename)?;
        self.entries.insert(id, CatalogEntry { filename, size, checksum });
        Ok(())
    }

    /// Fold another index (e.g. prereleases) into this one
    pub fn merge(&mut self, other: RemoteCatalog) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &PackageId) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PackageId, &CatalogEntry)> {
        self.entries.iter()
    }
}

fn version_string(value: &Value) -> Option<String> {
    match value {
        Value::Str(_) => value.as_str().map(str::to_string),
        Value::UserMarshal { class, data } if class == "Gem::Version" => match data.as_ref() {
            Value::Array(parts) => parts.first().and_then(Value::as_str).map(str::to_string),
            other => other.as_str().map(str::to_string),
        },
        _ => None,
    }
}
