// SPDX-License-Identifier: GPL-3.0-only
//! Mirror a RubyGems repository into a local directory.
//!
//! One run resolves the remote index, plans which gems to fetch and which to
//! delete, executes both with a bounded worker pool, then fetches gemspecs and
//! the fixed index files so the directory can be served as a repository.

pub mod config;
pub mod index;
pub mod layout;
pub mod logging;
pub mod pool;
pub mod sync;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::{Config, MirrorConfig};
pub use index::{IndexResolver, RemoteCatalog};
pub use pool::{BatchReport, WorkerPool};
pub use sync::{Mirror, Progress, ProgressFn, RunOptions, RunState, RunSummary, SyncError};
pub use transport::{HttpTransport, Transport};
