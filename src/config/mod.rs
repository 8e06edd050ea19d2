// SPDX-License-Identifier: GPL-3.0-only
#[allow(clippy::module_inception)]
pub mod config;

pub use config::{Config, MirrorConfig, MAX_PARALLELISM, MAX_RETRIES};
