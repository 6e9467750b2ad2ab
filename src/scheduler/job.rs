//! Job definitions for the scheduler.
//!
//! This module defines the core job types used by the worker pool:
//!
//! - `JobSpec`: One external partition job (id, command, range, output path)
//! - `JobResult`: Result of job execution
//! - `JobStatus`: Status of a finished job

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::execution::CommandSpec;

use super::partition::EventRange;

/// Specification for one partition job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique identifier for the job within a run.
    pub id: String,
    /// Partition index, used in the artifact name.
    pub index: usize,
    /// Rendered external command.
    pub command: CommandSpec,
    /// Event range the job reduces.
    pub range: EventRange,
    /// Partition artifact the job is expected to write.
    pub output: PathBuf,
}

impl JobSpec {
    /// Creates a new job specification.
    pub fn new(
        id: impl Into<String>,
        index: usize,
        command: CommandSpec,
        range: EventRange,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            index,
            command,
            range,
            output: output.into(),
        }
    }

    /// An empty range is a no-op job: it succeeds without spawning anything
    /// and produces no artifact.
    pub fn is_noop(&self) -> bool {
        self.range.is_empty()
    }
}

/// Status of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// External process exited with status zero.
    Completed,
    /// Empty range; nothing was launched.
    Skipped,
    /// Process exited non-zero or could not be launched.
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Skipped => write!(f, "skipped"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// ID of the job.
    pub job_id: String,
    /// Final status.
    pub status: JobStatus,
    /// Exit code, when a process ran.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Failure description, when the job failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl JobResult {
    /// Creates a successful job result.
    pub fn success(job_id: impl Into<String>, duration: Duration) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Completed,
            exit_code: Some(0),
            error: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Creates a result for a no-op job.
    pub fn skipped(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Skipped,
            exit_code: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// Creates a failed job result.
    pub fn failure(
        job_id: impl Into<String>,
        exit_code: Option<i32>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            exit_code,
            error: Some(error.into()),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Returns whether the job succeeded (completed or trivially skipped).
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job(start: u64, end: u64) -> JobSpec {
        JobSpec::new(
            "stage2-Hbb-0",
            0,
            CommandSpec::new("python").arg("stage2.py"),
            EventRange::new(start, end),
            "/tmp/stage2_Hbb_0.root",
        )
    }

    #[test]
    fn test_noop_job() {
        assert!(make_job(0, 0).is_noop());
        assert!(!make_job(0, 10).is_noop());
    }

    #[test]
    fn test_job_result_constructors() {
        let ok = JobResult::success("a", Duration::from_millis(1500));
        assert!(ok.is_success());
        assert_eq!(ok.duration_ms, 1500);
        assert_eq!(ok.exit_code, Some(0));

        let skipped = JobResult::skipped("b");
        assert!(skipped.is_success());
        assert_eq!(skipped.status, JobStatus::Skipped);

        let failed = JobResult::failure("c", Some(1), "exited with status 1", Duration::ZERO);
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("exited with status 1"));
    }

    #[test]
    fn test_job_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
