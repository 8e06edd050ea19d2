// SPDX-License-Identifier: GPL-3.0-only
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::index::{IndexResolver, RemoteCatalog};
use crate::layout::{gem_path, gemspec_path, Layout, BASE_FILES};
use crate::pool::{BatchReport, ProgressHook, TaskError, TaskOutcome, WorkerPool};
use crate::sync::error::SyncError;
use crate::sync::plan::{self, ArtifactSet, SyncPlan};
use crate::transport::Transport;
use crate::utils::{validate_artifact_name, validate_relative_path};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ResolvingIndex,
    Planning,
    Fetching,
    Deleting,
    SpecFetching,
    Done,
    Failed,
}

/// Batch of tasks a progress update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetching,
    Deleting,
    SpecFetching,
    BaseFiles,
}

#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub phase: Phase,
    pub item: &'a str,
    pub completed: usize,
    pub total: usize,
    pub ok: bool,
}

pub type ProgressFn = Arc<dyn Fn(Progress<'_>) + Send + Sync>;

/// Which phases a run performs after gems are synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub fetch_specs: bool,
    pub skip_existing_specs: bool,
    pub fetch_base_files: bool,
}

impl RunOptions {
    pub fn from_config(config: &MirrorConfig) -> Self {
        Self {
            fetch_specs: true,
            skip_existing_specs: config.skip_existing_specs,
            fetch_base_files: config.fetch_base_files,
        }
    }

    /// Only gems: resolve, fetch, delete
    pub fn gems_only() -> Self {
        Self {
            fetch_specs: false,
            skip_existing_specs: false,
            fetch_base_files: false,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub state: RunState,
    pub catalog_size: usize,
    pub to_fetch: usize,
    pub to_delete: usize,
    pub fetched: BatchReport,
    pub deleted: BatchReport,
    pub specs: Option<BatchReport>,
    pub base_files: Option<BatchReport>,
}

impl RunSummary {
    pub fn total_failed(&self) -> usize {
        self.fetched.failed
            + self.deleted.failed
            + self.specs.as_ref().map_or(0, |r| r.failed)
            + self.base_files.as_ref().map_or(0, |r| r.failed)
    }
}

/// Synchronizes one local mirror with one remote repository
pub struct Mirror {
    config: MirrorConfig,
    layout: Layout,
    transport: Arc<dyn Transport>,
    state: RunState,
}

impl Mirror {
    pub fn new(config: MirrorConfig, transport: Arc<dyn Transport>) -> Self {
        let layout = Layout::new(config.source.clone(), config.destination.clone());
        Self {
            config,
            layout,
            transport,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub async fn resolve_index(&self) -> Result<RemoteCatalog, SyncError> {
        IndexResolver::new(Arc::clone(&self.transport), self.layout.clone())
            .resolve(self.config.include_prerelease)
            .await
    }

    /// Gems currently in the mirror; creates the gems directory if missing
    pub async fn local_artifacts(&self) -> Result<ArtifactSet, SyncError> {
        let gems_dir = self.layout.gems_dir();
        tokio::fs::create_dir_all(&gems_dir)
            .await
            .map_err(|source| SyncError::Filesystem {
                path: gems_dir.clone(),
                source,
            })?;
        ArtifactSet::from_dir(&gems_dir).await
    }

    pub fn plan(&self, catalog: &RemoteCatalog, local: &ArtifactSet) -> Result<SyncPlan, SyncError> {
        plan::plan(catalog, local, self.config.allow_empty_index)
    }

    /// Download every named gem into `gems/`
    pub async fn execute_fetch(
        &self,
        names: &[String],
        parallelism: NonZeroUsize,
        on_progress: ProgressFn,
    ) -> BatchReport {
        let tasks = names.iter().map(|name| {
            let relative = gem_path(name);
            let checked = validate_artifact_name(name).map_err(|e| TaskError::UnsafePath(e.to_string()));
            (name.clone(), self.fetch_task(relative, checked))
        });
        self.run_phase(Phase::Fetching, names.len(), parallelism, on_progress, tasks)
            .await
    }

    /// Remove every named gem from `gems/`; already missing files count as removed
    pub async fn execute_delete(
        &self,
        names: &[String],
        parallelism: NonZeroUsize,
        on_progress: ProgressFn,
    ) -> BatchReport {
        let tasks = names.iter().map(|name| {
            let path = self.layout.local(&gem_path(name));
            let checked = validate_artifact_name(name).map_err(|e| TaskError::UnsafePath(e.to_string()));
            let task = async move {
                checked?;
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(source) => Err(TaskError::Filesystem { path, source }),
                }
            };
            (name.clone(), task)
        });
        self.run_phase(Phase::Deleting, names.len(), parallelism, on_progress, tasks)
            .await
    }

    /// Download the gemspec of every gem in `local`
    pub async fn fetch_specs(
        &self,
        local: &ArtifactSet,
        parallelism: NonZeroUsize,
        skip_existing: bool,
        on_progress: ProgressFn,
    ) -> BatchReport {
        let mut wanted = Vec::with_capacity(local.len());
        for artifact in local.names() {
            let relative = gemspec_path(artifact);
            if skip_existing && self.layout.local(&relative).is_file() {
                debug!(spec = %relative, "Skipping existing gemspec");
                continue;
            }
            wanted.push(relative);
        }

        let total = wanted.len();
        info!(total, skipped = local.len() - total, "Fetching gemspecs");
        let tasks = wanted.into_iter().map(|relative| {
            let checked = validate_relative_path(&relative).map_err(|e| TaskError::UnsafePath(e.to_string()));
            (relative.clone(), self.fetch_task(relative, checked))
        });
        self.run_phase(Phase::SpecFetching, total, parallelism, on_progress, tasks)
            .await
    }

    /// Download the fixed index files one after another
    pub async fn fetch_base_files(&self, on_progress: ProgressFn) -> BatchReport {
        let tasks = BASE_FILES
            .iter()
            .map(|file| (file.to_string(), self.fetch_task(file.to_string(), Ok(()))));
        self.run_phase(Phase::BaseFiles, BASE_FILES.len(), NonZeroUsize::MIN, on_progress, tasks)
            .await
    }

    /// Resolve, plan, fetch, delete, then fetch specs and base files.
    ///
    /// Only index and planning failures end the run early; task failures are
    /// tallied in the summary. Base files are fetched after the gemspecs,
    /// not between the gem and gemspec phases, and still under
    /// [`RunState::SpecFetching`].
    pub async fn run(&mut self, options: RunOptions, on_progress: ProgressFn) -> Result<RunSummary, SyncError> {
        self.transition(RunState::ResolvingIndex);
        let catalog = self.resolve_index().await.inspect_err(|_| self.transition(RunState::Failed))?;

        self.transition(RunState::Planning);
        let sync_plan = match self.local_artifacts().await {
            Ok(local) => self.plan(&catalog, &local),
            Err(e) => Err(e),
        };
        let sync_plan = sync_plan.inspect_err(|_| self.transition(RunState::Failed))?;

        let parallelism = self.config.parallelism();

        self.transition(RunState::Fetching);
        let fetched = self
            .execute_fetch(&sync_plan.to_fetch, parallelism, Arc::clone(&on_progress))
            .await;

        self.transition(RunState::Deleting);
        let deleted = self
            .execute_delete(&sync_plan.to_delete, parallelism, Arc::clone(&on_progress))
            .await;

        self.transition(RunState::SpecFetching);
        let specs = if options.fetch_specs {
            Some(match self.local_artifacts().await {
                Ok(local) => {
                    self.fetch_specs(&local, parallelism, options.skip_existing_specs, Arc::clone(&on_progress))
                        .await
                }
                Err(e) => {
                    warn!(error = %e, "Could not list gems for gemspec fetching");
                    let gems_dir = self.layout.gems_dir();
                    let mut report = BatchReport::default();
                    report.record_failure(gems_dir.display().to_string(), listing_failure(e, gems_dir));
                    report
                }
            })
        } else {
            None
        };
        let base_files = if options.fetch_base_files {
            Some(self.fetch_base_files(Arc::clone(&on_progress)).await)
        } else {
            None
        };

        self.transition(RunState::Done);
        let summary = RunSummary {
            state: self.state,
            catalog_size: catalog.len(),
            to_fetch: sync_plan.to_fetch.len(),
            to_delete: sync_plan.to_delete.len(),
            fetched,
            deleted,
            specs,
            base_files,
        };
        info!(
            source = %self.layout.source(),
            fetched = summary.fetched.succeeded,
            deleted = summary.deleted.succeeded,
            failed = summary.total_failed(),
            "Mirror run finished"
        );
        Ok(summary)
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Run state changed");
        self.state = next;
    }

    fn fetch_task(
        &self,
        relative: String,
        checked: Result<(), TaskError>,
    ) -> impl Future<Output = Result<(), TaskError>> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        let url = self.layout.remote(&relative);
        let destination = self.layout.local(&relative);
        async move {
            checked?;
            transport.fetch(&url, &destination).await?;
            Ok(())
        }
    }

    async fn run_phase<I, F>(
        &self,
        phase: Phase,
        total: usize,
        parallelism: NonZeroUsize,
        on_progress: ProgressFn,
        tasks: I,
    ) -> BatchReport
    where
        I: IntoIterator<Item = (String, F)>,
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        info!(phase = ?phase, total, workers = parallelism.get(), "Phase started");

        let hook: ProgressHook = Arc::new(move |outcome: TaskOutcome<'_>| {
            on_progress(Progress {
                phase,
                item: outcome.label,
                completed: outcome.completed,
                total,
                ok: outcome.error.is_none(),
            })
        });
        let pool = WorkerPool::new(parallelism, hook);

        for (label, task) in tasks {
            if let Err(e) = pool.submit(label, task).await {
                warn!(phase = ?phase, error = %e, "Stopped submitting tasks");
                break;
            }
        }
        let report = pool.drain().await;
        pool.shutdown().await;

        info!(
            phase = ?phase,
            succeeded = report.succeeded,
            failed = report.failed,
            "Phase finished"
        );
        report
    }
}

fn listing_failure(error: SyncError, gems_dir: PathBuf) -> TaskError {
    match error {
        SyncError::Filesystem { path, source } => TaskError::Filesystem { path, source },
        other => TaskError::Filesystem {
            path: gems_dir,
            source: std::io::Error::other(other.to_string()),
        },
    }
}
