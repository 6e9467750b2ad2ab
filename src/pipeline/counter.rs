//! Event counting for the stage1 artifact.
//!
//! The partitioner needs the total number of events `N` before stage2 jobs
//! can be planned. Two counters are provided: one reading the Parquet footer
//! in-process, and one delegating to an external query command that prints
//! the count on stdout.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PipelineError;
use crate::execution::ProcessLauncher;
use crate::storage::count_events;

use super::templates::{CommandTemplate, TemplateVars};

/// Reads the number of events held by an artifact.
#[async_trait]
pub trait EventCounter: Send + Sync {
    /// Returns the event count of `artifact`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::ArtifactUnreadable` if the artifact is missing
    /// or cannot be read.
    async fn count(&self, artifact: &Path) -> Result<u64, PipelineError>;
}

/// Counts events from a Parquet event table footer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetEventCounter;

#[async_trait]
impl EventCounter for ParquetEventCounter {
    async fn count(&self, artifact: &Path) -> Result<u64, PipelineError> {
        let path = artifact.to_path_buf();
        let result = tokio::task::spawn_blocking(move || count_events(&path))
            .await
            .map_err(|e| unreadable(artifact, format!("count task panicked: {}", e)))?;

        let events = result.map_err(|e| unreadable(artifact, e.to_string()))?;
        debug!(path = %artifact.display(), events, "Counted events");
        Ok(events)
    }
}

/// Counts events by running an external query command.
pub struct CommandEventCounter {
    template: CommandTemplate,
    launcher: Arc<dyn ProcessLauncher>,
}

impl CommandEventCounter {
    pub fn new(template: CommandTemplate, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { template, launcher }
    }
}

#[async_trait]
impl EventCounter for CommandEventCounter {
    async fn count(&self, artifact: &Path) -> Result<u64, PipelineError> {
        if !artifact.is_file() {
            return Err(unreadable(artifact, "file does not exist".to_string()));
        }

        let spec = self
            .template
            .render(&TemplateVars::new().set_path("input", artifact))?;
        let output = self
            .launcher
            .launch(&spec)
            .await
            .map_err(|e| unreadable(artifact, e.to_string()))?;

        if !output.is_success() {
            return Err(unreadable(artifact, output.failure_reason()));
        }

        parse_count(&output.stdout).ok_or_else(|| {
            unreadable(
                artifact,
                format!("count command printed no event count: {:?}", output.stdout.trim()),
            )
        })
    }
}

/// Takes the last non-empty stdout line as the count.
fn parse_count(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()?
        .parse()
        .ok()
}

fn unreadable(path: &Path, reason: String) -> PipelineError {
    PipelineError::ArtifactUnreadable {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::SystemLauncher;
    use crate::storage::event_table::test_support::labelled_table;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1234\n"), Some(1234));
        assert_eq!(parse_count("opening file\n  42  \n\n"), Some(42));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("lots"), None);
    }

    #[tokio::test]
    async fn test_parquet_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage1_Hbb.parquet");
        labelled_table(&[1, 2, 3, 4], &[]).write(&path).unwrap();

        assert_eq!(ParquetEventCounter.count(&path).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_parquet_counter_missing_artifact() {
        let err = ParquetEventCounter
            .count(Path::new("/nonexistent/stage1_Hbb.parquet"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_parquet_counter_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage1_Hbb.parquet");
        std::fs::write(&path, b"not a parquet file").unwrap();

        let err = ParquetEventCounter.count(&path).await.unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_command_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage1_Hbb.root");
        std::fs::write(&path, b"opaque").unwrap();

        let counter = CommandEventCounter::new(
            CommandTemplate::new("sh", ["-c", "echo 9000", "{input}"]),
            Arc::new(SystemLauncher::new()),
        );
        assert_eq!(counter.count(&path).await.unwrap(), 9000);

        let failing = CommandEventCounter::new(
            CommandTemplate::new("sh", ["-c", "exit 3", "{input}"]),
            Arc::new(SystemLauncher::new()),
        );
        let err = failing.count(&path).await.unwrap_err();
        assert!(err.to_string().contains("status 3"));
    }
}
