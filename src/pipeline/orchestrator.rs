//! Pipeline orchestrator for the two-stage reduction.
//!
//! This module provides the main `PipelineOrchestrator` that coordinates:
//! - Sample resolution through the process catalog
//! - The full-dataset stage1 job
//! - Event-range partitioning and stage2 fan-out
//! - Merge, output copy and cleanup

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::execution::{ProcessLauncher, SystemLauncher};
use crate::scheduler::{
    partition, unassigned_events, EventRange, JobResult, JobSpec, WorkerPool, WorkerPoolConfig,
};

use super::catalog::{Dataset, ProcessCatalog};
use super::cleanup::{clean_work_dir, cleanup_stage2, CleanupSummary};
use super::config::{same_directory, ConfigError, PipelineConfig, RunMode};
use super::counter::{CommandEventCounter, EventCounter, ParquetEventCounter};
use super::merge::{merge_partitions, CommandMerger, Merger};
use super::naming::ArtifactNaming;
use super::templates::TemplateVars;

/// State of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Stage1Running,
    Stage1Done,
    Partitioning,
    WorkersRunning,
    Merging,
    CopyingOutput,
    CleaningUp,
    Done,
    /// Terminal; transient files are left for mode `clean`.
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Stage1Running => "stage1_running",
            PipelineState::Stage1Done => "stage1_done",
            PipelineState::Partitioning => "partitioning",
            PipelineState::WorkersRunning => "workers_running",
            PipelineState::Merging => "merging",
            PipelineState::CopyingOutput => "copying_output",
            PipelineState::CleaningUp => "cleaning_up",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Record of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub sample: String,
    /// Resolved process name; absent for mode `clean`.
    pub process: Option<String>,
    /// Event count of the stage1 artifact.
    pub events: Option<u64>,
    pub ranges: Vec<EventRange>,
    pub jobs: Vec<JobResult>,
    pub merged_output: Option<PathBuf>,
    pub cleanup: Option<CleanupSummary>,
    /// Every state the run went through, in order.
    pub states: Vec<PipelineState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new(mode: RunMode, sample: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            sample: sample.to_string(),
            process: None,
            events: None,
            ranges: Vec::new(),
            jobs: Vec::new(),
            merged_output: None,
            cleanup: None,
            states: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Number of non-empty partitions that were merged.
    pub fn partitions(&self) -> usize {
        self.ranges.iter().filter(|r| !r.is_empty()).count()
    }

    /// Number of events covered by the partitions.
    pub fn assigned_events(&self) -> u64 {
        self.ranges.iter().map(EventRange::len).sum()
    }

    /// One-line stage2 summary, if stage2 produced an output.
    pub fn summary_line(&self) -> Option<String> {
        let output = self.merged_output.as_ref()?;
        Some(format!(
            "Stage2 complete: {} ({} of {} events across {} partitions)",
            output.display(),
            self.assigned_events(),
            self.events.unwrap_or(0),
            self.partitions()
        ))
    }
}

/// Main coordinator for reduction runs.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    catalog: Arc<ProcessCatalog>,
    launcher: Arc<dyn ProcessLauncher>,
    merger: Option<Arc<dyn Merger>>,
    counter: Option<Arc<dyn EventCounter>>,
    state: Mutex<PipelineState>,
}

impl PipelineOrchestrator {
    /// Creates a new orchestrator with the system process launcher.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ConfigError` if the configuration is invalid.
    pub fn new(config: PipelineConfig, catalog: Arc<ProcessCatalog>) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            launcher: Arc::new(SystemLauncher::new()),
            merger: None,
            counter: None,
            state: Mutex::new(PipelineState::Idle),
        })
    }

    /// Replaces the process launcher used for every external job.
    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replaces the merge collaborator (default: the merge template).
    pub fn with_merger(mut self, merger: Arc<dyn Merger>) -> Self {
        self.merger = Some(merger);
        self
    }

    /// Replaces the event counter (default: the count template if one is
    /// configured, otherwise the Parquet footer).
    pub fn with_counter(mut self, counter: Arc<dyn EventCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current (or final) state of the most recent run.
    pub fn state(&self) -> PipelineState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(PipelineState::Failed)
    }

    /// Runs the configured mode for `sample`.
    ///
    /// # Errors
    ///
    /// Any error is fatal and leaves the orchestrator in `PipelineState::Failed`.
    pub async fn run(&self, sample: &str) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::new(self.config.mode, sample);
        self.transition(&mut report, PipelineState::Idle);

        info!(
            run_id = %report.run_id,
            sample = %sample,
            mode = %self.config.mode,
            workers = self.config.workers,
            "Starting pipeline run"
        );

        match self.execute(sample, &mut report).await {
            Ok(()) => {
                self.transition(&mut report, PipelineState::Done);
                report.finished_at = Some(Utc::now());
                Ok(report)
            }
            Err(e) => {
                self.transition(&mut report, PipelineState::Failed);
                error!(
                    run_id = %report.run_id,
                    stage = ?e.stage(),
                    error = %e,
                    "Pipeline run failed"
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, sample: &str, report: &mut RunReport) -> Result<(), PipelineError> {
        if self.config.mode == RunMode::Clean {
            clean_work_dir(&self.config.work_dir).await;
            return Ok(());
        }

        let dataset = self.catalog.resolve(sample, &self.config.input_dir)?;
        report.process = Some(dataset.process.clone());
        let naming = ArtifactNaming::new(&dataset.process, &self.config.artifact_extension);

        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        if self.config.mode.runs_stage1() {
            self.run_stage1(&dataset, &naming, report).await?;
        }
        if self.config.mode.runs_stage2() {
            self.run_stage2(&dataset, &naming, report).await?;
        }
        Ok(())
    }

    async fn run_stage1(
        &self,
        dataset: &Dataset,
        naming: &ArtifactNaming,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        self.transition(report, PipelineState::Stage1Running);

        let job_id = format!("stage1-{}", dataset.process);
        let output = naming.full_path(&self.config.work_dir, 1);
        let vars = TemplateVars::new()
            .set_path("output", &output)
            .set("files", dataset.input_glob())
            .set("workers", self.config.workers);
        let spec = self.config.job_templates.stage1.render(&vars)?;

        info!(run_id = %report.run_id, job_id = %job_id, command = %spec, "Running stage1");

        let reason = match self.launcher.launch(&spec).await {
            Ok(out) if out.is_success() => None,
            Ok(out) => Some(out.failure_reason()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = reason {
            return Err(PipelineError::ExternalJobFailure {
                stage: 1,
                job_id,
                reason,
            });
        }

        self.transition(report, PipelineState::Stage1Done);
        Ok(())
    }

    async fn run_stage2(
        &self,
        dataset: &Dataset,
        naming: &ArtifactNaming,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let work_dir = &self.config.work_dir;
        let workers = self.config.workers;

        self.transition(report, PipelineState::Partitioning);
        let stage1 = naming.full_path(work_dir, 1);
        let events = self.counter().count(&stage1).await?;
        let ranges = partition(events, workers)?;
        report.events = Some(events);
        report.ranges = ranges.clone();

        let dropped = unassigned_events(events, workers);
        if dropped > 0 {
            warn!(
                run_id = %report.run_id,
                events,
                workers,
                dropped,
                "Remainder events are not assigned to any partition"
            );
        }

        let jobs = self.build_jobs(dataset, naming, &stage1, &ranges)?;

        self.transition(report, PipelineState::WorkersRunning);
        let pool = WorkerPool::new(WorkerPoolConfig::new(workers).with_name("stage2"))
            .map_err(|_| PipelineError::InvalidPartition { workers })?;
        let results = pool
            .dispatch_jobs(jobs.clone(), Arc::clone(&self.launcher))
            .await;

        let failed: Vec<String> = jobs
            .iter()
            .filter(|job| {
                results
                    .iter()
                    .any(|r| r.job_id == job.id && !r.is_success())
            })
            .map(|job| job.id.clone())
            .collect();
        report.jobs = results;

        let stats = pool.stats();
        info!(
            run_id = %report.run_id,
            succeeded = stats.succeeded,
            failed = stats.failed,
            mean_ms = stats.mean_duration.as_millis() as u64,
            "Stage2 workers drained"
        );

        if !failed.is_empty() {
            return Err(PipelineError::WorkerJobFailure {
                failed,
                total: jobs.len(),
            });
        }

        self.transition(report, PipelineState::Merging);
        let expected: Vec<PathBuf> = jobs
            .iter()
            .filter(|job| !job.is_noop())
            .map(|job| job.output.clone())
            .collect();
        let merged = naming.full_path(work_dir, 2);
        merge_partitions(self.merger().as_ref(), &expected, &merged).await?;

        self.transition(report, PipelineState::CopyingOutput);
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        if same_directory(&self.config.output_dir, work_dir) {
            return Err(ConfigError::ValidationFailed(format!(
                "output_dir {} resolves to work_dir {}",
                self.config.output_dir.display(),
                work_dir.display()
            ))
            .into());
        }
        let destination = self.config.output_dir.join(naming.full_name(2));
        tokio::fs::copy(&merged, &destination).await?;
        report.merged_output = Some(destination);

        self.transition(report, PipelineState::CleaningUp);
        report.cleanup = Some(cleanup_stage2(work_dir, naming).await);

        Ok(())
    }

    fn build_jobs(
        &self,
        dataset: &Dataset,
        naming: &ArtifactNaming,
        stage1: &Path,
        ranges: &[EventRange],
    ) -> Result<Vec<JobSpec>, PipelineError> {
        ranges
            .iter()
            .enumerate()
            .map(|(index, range)| {
                let output = naming.partition_path(&self.config.work_dir, 2, index);
                let vars = TemplateVars::new()
                    .set_path("input", stage1)
                    .set_path("output", &output)
                    .set("start", range.start)
                    .set("end", range.end);
                let command = self.config.job_templates.stage2.render(&vars)?;
                Ok(JobSpec::new(
                    format!("stage2-{}-{}", dataset.process, index),
                    index,
                    command,
                    *range,
                    output,
                ))
            })
            .collect()
    }

    fn merger(&self) -> Arc<dyn Merger> {
        match self.merger {
            Some(ref merger) => Arc::clone(merger),
            None => Arc::new(CommandMerger::new(
                self.config.job_templates.merge.clone(),
                Arc::clone(&self.launcher),
            )),
        }
    }

    fn counter(&self) -> Arc<dyn EventCounter> {
        if let Some(ref counter) = self.counter {
            return Arc::clone(counter);
        }
        match self.config.job_templates.count {
            Some(ref template) => Arc::new(CommandEventCounter::new(
                template.clone(),
                Arc::clone(&self.launcher),
            )),
            None => Arc::new(ParquetEventCounter),
        }
    }

    fn transition(&self, report: &mut RunReport, next: PipelineState) {
        let previous = report.states.last().copied();
        report.states.push(next);
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
        match previous {
            Some(from) => info!(run_id = %report.run_id, from = %from, to = %next, "Pipeline state transition"),
            None => info!(run_id = %report.run_id, state = %next, "Pipeline initialised"),
        }
    }
}
