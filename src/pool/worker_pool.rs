// SPDX-License-Identifier: GPL-3.0-only
use futures_util::FutureExt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::pool::report::{BatchReport, TaskError};

type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Called once per finished task, after it finished
pub type ProgressHook = Arc<dyn Fn(TaskOutcome<'_>) + Send + Sync>;

/// What the progress hook sees for one finished task
#[derive(Debug, Clone, Copy)]
pub struct TaskOutcome<'a> {
    pub label: &'a str,
    /// Tasks finished in the current batch, this one included
    pub completed: usize,
    pub error: Option<&'a TaskError>,
}

#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    #[error("Worker pool is closed")]
    Closed,
}

struct Job {
    label: String,
    task: TaskFuture,
}

struct Shared {
    report: Mutex<BatchReport>,
    finished: AtomicUsize,
    pending: watch::Sender<usize>,
    on_complete: ProgressHook,
}

/// Fixed number of workers pulling from a bounded queue.
///
/// `submit` waits once the queue is full. `drain` waits until every submitted
/// task has finished and hands back the batch tallies, after which the pool
/// accepts a new batch.
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: NonZeroUsize, on_complete: ProgressHook) -> Self {
        let size = size.get();
        let (sender, receiver) = mpsc::channel(size * 2);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let (pending, _) = watch::channel(0usize);

        let shared = Arc::new(Shared {
            report: Mutex::new(BatchReport::default()),
            finished: AtomicUsize::new(0),
            pending,
            on_complete,
        });

        let workers = (0..size)
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&receiver), Arc::clone(&shared))))
            .collect();

        Self { sender, shared, workers }
    }

    /// Queue a task, waiting for room when the queue is full
    pub async fn submit<F>(&self, label: impl Into<String>, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let permit = self.sender.reserve().await.map_err(|_| PoolError::Closed)?;
        self.shared.pending.send_modify(|pending| *pending += 1);
        permit.send(Job {
            label: label.into(),
            task: Box::pin(task),
        });
        Ok(())
    }

    /// Wait for the queue to empty and every worker to go idle
    pub async fn drain(&self) -> BatchReport {
        let mut idle = self.shared.pending.subscribe();
        // The sender lives in `self.shared`, so the channel cannot close here
        let _ = idle.wait_for(|pending| *pending == 0).await;

        self.shared.finished.store(0, Ordering::SeqCst);
        std::mem::take(&mut *lock(&self.shared.report))
    }

    /// Close the queue and wait for the workers to exit
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker exited abnormally");
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    shared: Arc<Shared>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(Job { label, task }) = job else {
            break;
        };

        let result = AssertUnwindSafe(task)
            .catch_unwind()
            .await
            .unwrap_or(Err(TaskError::Panicked));

        let completed = shared.finished.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(error) = &result {
            debug!(worker = id, label = %label, error = %error, "Task failed");
        }
        let outcome = TaskOutcome {
            label: &label,
            completed,
            error: result.as_ref().err(),
        };
        if std::panic::catch_unwind(AssertUnwindSafe(|| (shared.on_complete)(outcome))).is_err() {
            warn!(worker = id, label = %label, "Progress hook panicked");
        }

        {
            let mut report = lock(&shared.report);
            match result {
                Ok(()) => report.record_success(),
                Err(error) => report.record_failure(label, error),
            }
        }

        shared.pending.send_modify(|pending| *pending -= 1);
    }
}

fn lock(report: &Mutex<BatchReport>) -> std::sync::MutexGuard<'_, BatchReport> {
    report.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::collections::HashSet;
    use std::time::Duration;

    fn counting_hook() -> (ProgressHook, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: ProgressHook = Arc::new(move |outcome: TaskOutcome<'_>| {
            sink.lock().unwrap().push(outcome.label.to_string());
        });
        (hook, seen)
    }

    fn pool_size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_every_task_runs_once_for_any_pool_size() {
        for size in [1, 3, 8, 64] {
            let (hook, seen) = counting_hook();
            let pool = WorkerPool::new(pool_size(size), hook);
            let runs = Arc::new(AtomicUsize::new(0));

            for i in 0..40 {
                let runs = Arc::clone(&runs);
                pool.submit(format!("task-{}", i), async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
            }

            let report = pool.drain().await;
            assert_eq!(report.succeeded, 40, "pool size {}", size);
            assert_eq!(report.failed, 0);
            assert_eq!(runs.load(Ordering::SeqCst), 40);

            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 40);
            assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 40);
            drop(seen);

            pool.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_failures_are_recorded_not_raised() {
        let (hook, seen) = counting_hook();
        let pool = WorkerPool::new(pool_size(5), hook);

        for i in 0..25 {
            pool.submit(format!("gem-{}", i), async move {
                if i % 10 == 3 {
                    Err(TaskError::Transport(TransportError::Network {
                        url: format!("http://mirror/gem-{}", i),
                        message: "connection reset".to_string(),
                    }))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        }

        let report = pool.drain().await;
        assert_eq!(report.succeeded, 22);
        assert_eq!(report.failed, 3);
        let mut failed: Vec<_> = report.failed_labels().collect();
        failed.sort();
        assert_eq!(failed, vec!["gem-13", "gem-23", "gem-3"]);
        assert_eq!(seen.lock().unwrap().len(), 25);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_kill_worker() {
        let (hook, _) = counting_hook();
        let pool = WorkerPool::new(pool_size(1), hook);

        pool.submit("boom", async {
            if true {
                panic!("task blew up");
            }
            Ok(())
        })
        .await
        .unwrap();
        pool.submit("fine", async { Ok(()) }).await.unwrap();

        let report = pool.drain().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(matches!(report.failures[0].error, TaskError::Panicked));
    }

    #[tokio::test]
    async fn test_pool_is_reusable_after_drain() {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completed);
        let hook: ProgressHook = Arc::new(move |outcome: TaskOutcome<'_>| {
            sink.lock().unwrap().push(outcome.completed);
        });
        let pool = WorkerPool::new(pool_size(2), hook);

        for _ in 0..3 {
            pool.submit("first", async { Ok(()) }).await.unwrap();
        }
        assert_eq!(pool.drain().await.succeeded, 3);

        for _ in 0..2 {
            pool.submit("second", async { Ok(()) }).await.unwrap();
        }
        let report = pool.drain().await;
        assert_eq!(report.succeeded, 2);

        let mut completed = completed.lock().unwrap().clone();
        completed.sort();
        assert_eq!(completed, vec![1, 1, 2, 2, 3]);
    }

    #[tokio::test]
    async fn test_drain_on_empty_pool_returns_immediately() {
        let (hook, _) = counting_hook();
        let pool = WorkerPool::new(pool_size(4), hook);

        let report = tokio::time::timeout(Duration::from_secs(1), pool.drain())
            .await
            .unwrap();
        assert_eq!(report.completed(), 0);
    }

    #[tokio::test]
    async fn test_submit_blocks_when_queue_is_full() {
        let (hook, _) = counting_hook();
        let pool = WorkerPool::new(pool_size(1), hook);
        let (release, gate) = watch::channel(false);

        // One task occupies the worker, two fill the queue
        for _ in 0..3 {
            let mut gate = gate.clone();
            pool.submit("held", async move {
                let _ = gate.wait_for(|open| *open).await;
                Ok(())
            })
            .await
            .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.submit("extra", async { Ok(()) })).await;
        assert!(blocked.is_err());

        release.send(true).unwrap();
        let report = pool.drain().await;
        assert_eq!(report.succeeded, 3);
    }
}
