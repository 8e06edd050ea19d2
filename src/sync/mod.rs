// SPDX-License-Identifier: GPL-3.0-only
pub mod error;
pub mod executor;
pub mod plan;

pub use error::SyncError;
pub use executor::{Mirror, Phase, Progress, ProgressFn, RunOptions, RunState, RunSummary};
pub use plan::{diff, plan, ArtifactSet, SyncPlan};
