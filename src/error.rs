//! Error types for event-stager operations.
//!
//! Defines the error taxonomy shared by the major subsystems:
//! - Pipeline orchestration (configuration, external jobs, merge)
//! - Label consistency filtering (isolated per file)

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::ConfigError;

/// Fatal errors raised by the pipeline orchestrator.
///
/// Any of these terminates the run; none of them is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unknown sample/process or an invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// A full-dataset or merge job could not be launched or exited non-zero.
    #[error("Stage {stage} job '{job_id}' failed: {reason}")]
    ExternalJobFailure {
        stage: u8,
        job_id: String,
        reason: String,
    },

    /// The stage1 artifact is missing or corrupt when stage2 starts.
    #[error("Artifact '{}' is unreadable: {reason}", .path.display())]
    ArtifactUnreadable { path: PathBuf, reason: String },

    /// One or more partition jobs failed; the pool was fully drained first.
    #[error("{} of {total} partition jobs failed: {}", .failed.len(), .failed.join(", "))]
    WorkerJobFailure { failed: Vec<String>, total: usize },

    /// Partition outputs do not match the submitted ranges, or the merge itself failed.
    #[error("Merge failed (expected {expected} partition artifacts, found {found}): {detail}")]
    MergeFailure {
        expected: usize,
        found: usize,
        detail: String,
    },

    /// The partitioner was asked for zero workers.
    #[error("Invalid partition request: worker count must be at least 1, got {workers}")]
    InvalidPartition { workers: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Returns the pipeline stage the error is attributed to, if any.
    pub fn stage(&self) -> Option<u8> {
        match self {
            PipelineError::ExternalJobFailure { stage, .. } => Some(*stage),
            PipelineError::ArtifactUnreadable { .. }
            | PipelineError::WorkerJobFailure { .. }
            | PipelineError::MergeFailure { .. }
            | PipelineError::InvalidPartition { .. } => Some(2),
            PipelineError::ConfigError(_) | PipelineError::Io(_) => None,
        }
    }
}

/// Per-file errors from the label consistency filter.
///
/// These never abort sibling files or the batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Missing field '{field}' in {}", .path.display())]
    MissingField { path: PathBuf, field: String },

    #[error("No events found in {}", .path.display())]
    EmptyInput { path: PathBuf },

    #[error("Unexpected error in {}: {message}", .path.display())]
    Unexpected { path: PathBuf, message: String },
}

impl FilterError {
    /// Returns the file the error refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            FilterError::MissingField { path, .. }
            | FilterError::EmptyInput { path }
            | FilterError::Unexpected { path, .. } => path,
        }
    }
}
