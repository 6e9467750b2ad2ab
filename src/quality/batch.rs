//! Parallel filtering and auditing of many files.
//!
//! Every file is an independent unit on the shared bounded pool. A failing
//! file is reported in its own summary and never stops its siblings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::error::FilterError;
use crate::scheduler::{PoolError, PoolOutcome, PoolStats, WorkerPool, WorkerPoolConfig};

use super::filter::{audit_file, filter_file, FilterOutcome, LabelAudit};

/// Default concurrency for filtering.
pub const DEFAULT_FILTER_CONCURRENCY: usize = 8;

/// Default concurrency for read-only audits.
pub const DEFAULT_AUDIT_CONCURRENCY: usize = 16;

/// Outcome of filtering one file.
#[derive(Debug, Clone, Serialize)]
pub struct FilterReport {
    pub input: PathBuf,
    #[serde(with = "outcome_serde")]
    pub outcome: Result<FilterOutcome, FilterError>,
}

/// Outcome of auditing one file.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub input: PathBuf,
    #[serde(with = "outcome_serde")]
    pub outcome: Result<LabelAudit, FilterError>,
}

impl PoolOutcome for FilterReport {
    fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl PoolOutcome for AuditReport {
    fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl fmt::Display for FilterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.input.display())?;
        match &self.outcome {
            Ok(o) if o.kept == 0 => write!(
                f,
                "  no clean events found after filtering ({} dropped)",
                o.dropped
            ),
            Ok(o) => write!(
                f,
                "  filtered file saved to {}\n  kept {} events, dropped {} events with mixed labels",
                o.output.display(),
                o.kept,
                o.dropped
            ),
            Err(e) => write_error(f, e),
        }
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.input.display())?;
        match &self.outcome {
            Ok(a) if a.is_clean() => write!(f, "  all events have exactly one label"),
            Ok(a) => write!(
                f,
                "  {} events have multiple labels set, {} events have no label set (of {})",
                a.conflicts, a.unlabeled, a.events
            ),
            Err(e) => write_error(f, e),
        }
    }
}

fn write_error(f: &mut fmt::Formatter<'_>, err: &FilterError) -> fmt::Result {
    match err {
        FilterError::MissingField { field, .. } => write!(f, "  missing field: {}", field),
        FilterError::EmptyInput { .. } => write!(f, "  no events found, skipping"),
        FilterError::Unexpected { message, .. } => write!(f, "  unexpected error: {}", message),
    }
}

mod outcome_serde {
    use serde::{Serialize, Serializer};

    use crate::error::FilterError;

    #[derive(Serialize)]
    #[serde(rename_all = "snake_case")]
    enum Tagged<'a, T> {
        Ok(&'a T),
        Error(String),
    }

    pub fn serialize<S, T>(value: &Result<T, FilterError>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Ok(v) => Tagged::Ok(v),
            Err(e) => Tagged::<T>::Error(e.to_string()),
        }
        .serialize(serializer)
    }
}

/// Output path for a filtered file: `<stem>_filtered.<ext>`, next to the
/// input unless `output_dir` is given.
pub fn filtered_output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}_filtered.{}", stem, ext.to_string_lossy()),
        None => format!("{}_filtered", stem),
    };
    match output_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// Runs the label filter and audit over many files under bounded concurrency.
pub struct LabelFilter {
    labels: Arc<Vec<String>>,
    pool: WorkerPool,
}

impl LabelFilter {
    /// Creates a filter over `labels` with at most `concurrency` files in flight.
    pub fn new(labels: Vec<String>, concurrency: usize) -> Result<Self, PoolError> {
        let pool = WorkerPool::new(WorkerPoolConfig::new(concurrency).with_name("label-filter"))?;
        Ok(Self {
            labels: Arc::new(labels),
            pool,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Filters every `(input, output)` pair. Reports come back in completion order.
    pub async fn filter_files(&self, files: Vec<(PathBuf, PathBuf)>) -> Vec<FilterReport> {
        info!(files = files.len(), labels = self.labels.len(), "Filtering files");

        self.pool
            .run_all(files, |(input, output)| {
                let labels = Arc::clone(&self.labels);
                async move {
                    let path = input.clone();
                    let outcome = tokio::task::spawn_blocking(move || {
                        filter_file(&path, &labels, &output)
                    })
                    .await
                    .unwrap_or_else(|e| Err(join_error(&input, e)));
                    FilterReport { input, outcome }
                }
            })
            .await
    }

    /// Audits every file without writing anything.
    pub async fn audit_files(&self, files: Vec<PathBuf>) -> Vec<AuditReport> {
        info!(files = files.len(), labels = self.labels.len(), "Auditing files");

        self.pool
            .run_all(files, |input| {
                let labels = Arc::clone(&self.labels);
                async move {
                    let path = input.clone();
                    let outcome = tokio::task::spawn_blocking(move || audit_file(&path, &labels))
                        .await
                        .unwrap_or_else(|e| Err(join_error(&input, e)));
                    AuditReport { input, outcome }
                }
            })
            .await
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

fn join_error(path: &Path, err: tokio::task::JoinError) -> FilterError {
    FilterError::Unexpected {
        path: path.to_path_buf(),
        message: format!("filter task panicked: {}", err),
    }
}
