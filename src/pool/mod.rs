// SPDX-License-Identifier: GPL-3.0-only
pub mod report;
pub mod worker_pool;

pub use report::{BatchReport, FailedItem, TaskError};
pub use worker_pool::{PoolError, ProgressHook, TaskOutcome, WorkerPool};
