// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::validate_source_url;

/// Upper bound for per-phase workers
pub const MAX_PARALLELISM: usize = 256;
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Mirrors to synchronize, in order
    #[serde(default = "default_mirrors", rename = "mirror")]
    pub mirrors: Vec<MirrorConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Remote repository root, e.g. "https://rubygems.org"
    pub source: String,

    /// Local mirror root; must already exist
    pub destination: PathBuf,

    /// Workers per phase
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Also mirror `prerelease_specs.4.8.gz` entries
    #[serde(default)]
    pub include_prerelease: bool,

    /// Do not re-fetch gemspecs that already exist locally
    #[serde(default)]
    pub skip_existing_specs: bool,

    /// Fetch the fixed index files clients expect
    #[serde(default = "default_true")]
    pub fetch_base_files: bool,

    /// Allow an empty remote index to delete every local gem
    #[serde(default)]
    pub allow_empty_index: bool,

    /// Attempts per file before a transfer counts as failed
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from TOML file with environment variable overrides
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("GEM_MIRROR_CONFIG")
            .map(PathBuf::from)
            .ok();
        Self::load_from(config_path.as_deref(), |key| std::env::var(key).ok())
    }

    /// Load from `path` (default `gem-mirror.toml`), reading overrides through `env`
    pub fn load_from<F>(path: Option<&Path>, env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.unwrap_or_else(|| Path::new("gem-mirror.toml"));

        let mut config: Config = if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?
        } else {
            Config::default()
        };

        if let Some(val) = env("GEM_MIRROR_LOG_LEVEL") {
            config.log_level = val;
        }

        // Remaining overrides target the first mirror
        let first = config
            .mirrors
            .first_mut()
            .context("Config file lists no mirrors")?;
        if let Some(val) = env("GEM_MIRROR_SOURCE") {
            first.source = val;
        }
        if let Some(val) = env("GEM_MIRROR_DESTINATION") {
            first.destination = PathBuf::from(val);
        }
        if let Some(val) = env("GEM_MIRROR_PARALLELISM") {
            first.parallelism = val
                .parse()
                .with_context(|| format!("GEM_MIRROR_PARALLELISM is not a number: {}", val))?;
        }

        Ok(config)
    }

    /// Check every mirror before the engine sees it
    pub fn validate(&self) -> anyhow::Result<()> {
        for (index, mirror) in self.mirrors.iter().enumerate() {
            mirror
                .validate()
                .with_context(|| format!("Invalid mirror #{}", index + 1))?;
        }
        Ok(())
    }
}

impl MirrorConfig {
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            parallelism: default_parallelism(),
            include_prerelease: false,
            skip_existing_specs: false,
            fetch_base_files: true,
            allow_empty_index: false,
            retries: default_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_source_url(&self.source)?;

        if !self.destination.exists() {
            return Err(anyhow::anyhow!("Directory not found: {}", self.destination.display()));
        }
        if !self.destination.is_dir() {
            return Err(anyhow::anyhow!("Not a directory: {}", self.destination.display()));
        }
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(anyhow::anyhow!(
                "parallelism must be between 1 and {}, got {}",
                MAX_PARALLELISM,
                self.parallelism
            ));
        }
        if self.retries == 0 || self.retries > MAX_RETRIES {
            return Err(anyhow::anyhow!(
                "retries must be between 1 and {}, got {}",
                MAX_RETRIES,
                self.retries
            ));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow::anyhow!("timeout_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn parallelism(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.parallelism).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            mirrors: default_mirrors(),
        }
    }
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_mirrors() -> Vec<MirrorConfig> {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    vec![MirrorConfig::new(
        "http://production.s3.rubygems.org",
        home.join(".gem").join("rubygems"),
    )]
}

fn default_parallelism() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    300 // 5 minute timeout for large gems
}
