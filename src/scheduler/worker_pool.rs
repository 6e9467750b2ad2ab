//! Bounded worker pool.
//!
//! One pool abstraction serves both external partition jobs and in-process
//! file filtering. Tasks are driven with at most `num_workers` in flight; a
//! failing task never cancels its siblings and the pool always drains fully
//! before returning.
//!
//! # Features
//!
//! - Configurable pool size
//! - Full-barrier join (results are returned once every task finished)
//! - Completion-order results (callers must not rely on submission order)
//! - Pool statistics tracking

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::execution::ProcessLauncher;

use super::job::{JobResult, JobSpec};

/// Errors that can occur when building a worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool size must be at least one.
    #[error("Invalid pool size {0}: must be at least 1")]
    InvalidSize(usize),
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of tasks in flight.
    pub num_workers: usize,
    /// Label used in log lines ("stage2", "filter", ...).
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            name: "pool".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the pool name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Outcome reported by a pooled task, used for statistics.
pub trait PoolOutcome {
    /// Whether the task counts as a success.
    fn is_success(&self) -> bool;
}

impl PoolOutcome for JobResult {
    fn is_success(&self) -> bool {
        JobResult::is_success(self)
    }
}

impl<T, E> PoolOutcome for Result<T, E> {
    fn is_success(&self) -> bool {
        self.is_ok()
    }
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub num_workers: usize,
    pub succeeded: u64,
    pub failed: u64,
    /// Mean task wall-clock time over every finished task.
    pub mean_duration: Duration,
}

impl PoolStats {
    /// Number of finished tasks.
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Lock-free counters updated by in-flight tasks.
#[derive(Default)]
struct PoolCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    busy_micros: AtomicU64,
}

impl PoolCounters {
    fn record(&self, success: bool, elapsed: Duration) {
        let counter = if success { &self.succeeded } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
        self.busy_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    fn snapshot(&self, num_workers: usize) -> PoolStats {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let finished = succeeded + failed;
        let mean_duration = match finished {
            0 => Duration::ZERO,
            n => Duration::from_micros(self.busy_micros.load(Ordering::Relaxed) / n),
        };
        PoolStats {
            num_workers,
            succeeded,
            failed,
            mean_duration,
        }
    }
}

/// Worker pool running tasks under bounded concurrency.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Creates a new worker pool.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidSize` if `num_workers` is zero.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        if config.num_workers == 0 {
            return Err(PoolError::InvalidSize(0));
        }
        Ok(Self {
            config,
            counters: Arc::default(),
        })
    }

    /// Runs `task` over every item with at most `num_workers` in flight.
    ///
    /// Results are returned in completion order once all tasks finished.
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
        R: PoolOutcome,
    {
        let total = items.len();
        info!(
            pool = %self.config.name,
            tasks = total,
            num_workers = self.config.num_workers,
            "Worker pool started"
        );

        let task = &task;
        let results: Vec<R> = stream::iter(items)
            .map(|item| {
                let counters = Arc::clone(&self.counters);
                async move {
                    let start = Instant::now();
                    let outcome = task(item).await;
                    counters.record(outcome.is_success(), start.elapsed());
                    outcome
                }
            })
            .buffer_unordered(self.config.num_workers)
            .collect()
            .await;

        let stats = self.stats();
        info!(
            pool = %self.config.name,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Worker pool drained"
        );

        results
    }

    /// Dispatches partition jobs through `launcher`.
    ///
    /// No-op jobs succeed without launching anything. Launch errors and
    /// non-zero exits are recorded as failed results; nothing is retried.
    pub async fn dispatch_jobs(
        &self,
        jobs: Vec<JobSpec>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Vec<JobResult> {
        self.run_all(jobs, |job| {
            let launcher = Arc::clone(&launcher);
            async move { run_job(&job, launcher.as_ref()).await }
        })
        .await
    }

    /// Counters accumulated over every `run_all` call on this pool.
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.config.num_workers)
    }

    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }
}

/// Executes a single partition job.
async fn run_job(job: &JobSpec, launcher: &dyn ProcessLauncher) -> JobResult {
    if job.is_noop() {
        info!(job_id = %job.id, range = %job.range, "Empty range, skipping job");
        return JobResult::skipped(&job.id);
    }

    info!(job_id = %job.id, range = %job.range, command = %job.command, "Processing job");
    let start = Instant::now();

    match launcher.launch(&job.command).await {
        Ok(output) if output.is_success() => {
            info!(
                job_id = %job.id,
                duration_ms = output.duration.as_millis() as u64,
                "Job completed successfully"
            );
            JobResult::success(&job.id, start.elapsed())
        }
        Ok(output) => {
            warn!(
                job_id = %job.id,
                exit_code = output.exit_code,
                stderr = %output.stderr_tail(),
                "Job exited with non-zero status"
            );
            JobResult::failure(
                &job.id,
                Some(output.exit_code),
                output.failure_reason(),
                start.elapsed(),
            )
        }
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "Job could not be launched");
            JobResult::failure(&job.id, None, e.to_string(), start.elapsed())
        }
    }
}
