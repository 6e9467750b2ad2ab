//! Removal of transient artifacts.
//!
//! Cleanup never fails a run: missing files are skipped silently and removal
//! errors are logged and reported in the summary. Filesystem work runs on the
//! blocking thread pool.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::naming::ArtifactNaming;

/// What a cleanup pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl CleanupSummary {
    fn remove(&mut self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed transient artifact");
                self.removed.push(path.to_path_buf());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove transient artifact");
                self.failed.push(path.to_path_buf());
            }
        }
    }
}

/// Removes the stage1 artifact, the merged artifact and every stage2
/// partition artifact of one process from `work_dir`.
///
/// Idempotent: a second call on the same directory removes nothing.
pub async fn cleanup_stage2(work_dir: &Path, naming: &ArtifactNaming) -> CleanupSummary {
    let dir = work_dir.to_path_buf();
    let naming = naming.clone();
    tokio::task::spawn_blocking(move || remove_stage2_artifacts(&dir, &naming))
        .await
        .unwrap_or_else(|e| {
            warn!(work_dir = %work_dir.display(), error = %e, "Cleanup task panicked");
            CleanupSummary::default()
        })
}

fn remove_stage2_artifacts(work_dir: &Path, naming: &ArtifactNaming) -> CleanupSummary {
    let mut summary = CleanupSummary::default();

    summary.remove(&naming.full_path(work_dir, 1));
    summary.remove(&naming.full_path(work_dir, 2));

    let pattern = naming.partition_regex(2);
    let partitions: Vec<PathBuf> = WalkDir::new(work_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| pattern.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();

    for path in &partitions {
        summary.remove(path);
    }

    info!(
        work_dir = %work_dir.display(),
        removed = summary.removed.len(),
        failed = summary.failed.len(),
        "Cleaned up transient artifacts"
    );
    summary
}

/// Deletes the whole working directory. Returns whether anything was removed.
pub async fn clean_work_dir(work_dir: &Path) -> bool {
    match tokio::fs::remove_dir_all(work_dir).await {
        Ok(()) => {
            info!(work_dir = %work_dir.display(), "Removed working directory");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(work_dir = %work_dir.display(), "Working directory already absent");
            false
        }
        Err(e) => {
            warn!(work_dir = %work_dir.display(), error = %e, "Failed to remove working directory");
            false
        }
    }
}
