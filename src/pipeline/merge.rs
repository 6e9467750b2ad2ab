//! Merging partition artifacts into the final stage2 artifact.
//!
//! Before any merger runs, the expected partition artifacts are checked on
//! disk: one per non-empty range, no more and no fewer. Stragglers from
//! earlier runs are never picked up since only the expected paths are passed
//! to the merger.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::execution::ProcessLauncher;
use crate::storage::concat_tables;

use super::templates::{CommandTemplate, TemplateVars};

/// Combines partition artifacts into one artifact.
///
/// The result must hold the multiset union of the input events, whatever
/// order the inputs are given in.
#[async_trait]
pub trait Merger: Send + Sync {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), PipelineError>;
}

/// Delegates merging to an external utility.
pub struct CommandMerger {
    template: CommandTemplate,
    launcher: Arc<dyn ProcessLauncher>,
}

impl CommandMerger {
    pub fn new(template: CommandTemplate, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { template, launcher }
    }
}

#[async_trait]
impl Merger for CommandMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), PipelineError> {
        let vars = TemplateVars::new()
            .set_path("output", output)
            .set_list("inputs", inputs.iter().map(|p| p.display().to_string()));
        let spec = self.template.render(&vars)?;

        info!(command = %spec, inputs = inputs.len(), "Running merge utility");

        let result = self.launcher.launch(&spec).await;
        let detail = match result {
            Ok(out) if out.is_success() => None,
            Ok(out) => Some(out.failure_reason()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(detail) = detail {
            return Err(merge_failure(inputs.len(), inputs.len(), detail));
        }

        if !output.exists() {
            return Err(merge_failure(
                inputs.len(),
                inputs.len(),
                format!("merge utility did not create {}", output.display()),
            ));
        }
        Ok(())
    }
}

/// Concatenates Parquet event tables in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetMerger;

#[async_trait]
impl Merger for ParquetMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), PipelineError> {
        let paths = inputs.to_vec();
        let target = output.to_path_buf();
        let count = inputs.len();

        let result = tokio::task::spawn_blocking(move || {
            let table = concat_tables(&paths)?;
            table.write(&target)?;
            Ok::<usize, crate::storage::EventTableError>(table.num_events())
        })
        .await
        .map_err(|e| merge_failure(count, count, format!("merge task panicked: {}", e)))?;

        let events = result.map_err(|e| merge_failure(count, count, e.to_string()))?;
        info!(output = %output.display(), events, "Partition tables concatenated");
        Ok(())
    }
}

/// Verifies that every expected partition artifact exists, then merges them.
///
/// Returns the number of partition artifacts merged.
///
/// # Errors
///
/// Returns `PipelineError::MergeFailure` if no partition was expected, if
/// any expected artifact is missing, or if the merger itself fails.
pub async fn merge_partitions(
    merger: &dyn Merger,
    expected: &[PathBuf],
    output: &Path,
) -> Result<usize, PipelineError> {
    if expected.is_empty() {
        return Err(merge_failure(
            0,
            0,
            "no events assigned to any partition".to_string(),
        ));
    }

    let missing: Vec<&PathBuf> = expected.iter().filter(|p| !p.is_file()).collect();
    if !missing.is_empty() {
        let names: Vec<String> = missing
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect();
        warn!(missing = ?names, "Partition artifacts missing before merge");
        return Err(merge_failure(
            expected.len(),
            expected.len() - missing.len(),
            format!("missing {}", names.join(", ")),
        ));
    }

    merger.merge(expected, output).await?;
    Ok(expected.len())
}

fn merge_failure(expected: usize, found: usize, detail: String) -> PipelineError {
    PipelineError::MergeFailure {
        expected,
        found,
        detail,
    }
}
