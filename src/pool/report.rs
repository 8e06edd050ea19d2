// SPDX-License-Identifier: GPL-3.0-only
use std::path::PathBuf;

use crate::transport::TransportError;

/// Why a single task failed
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to touch unsafe path: {0}")]
    UnsafePath(String),

    #[error("Task panicked")]
    Panicked,
}

#[derive(Debug)]
pub struct FailedItem {
    pub label: String,
    pub error: TaskError,
}

/// Per-batch tallies collected by the pool
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedItem>,
}

impl BatchReport {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, label: String, error: TaskError) {
        self.failed += 1;
        self.failures.push(FailedItem { label, error });
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn failed_labels(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|item| item.label.as_str())
    }
}
