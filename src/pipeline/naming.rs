//! Artifact naming convention.
//!
//! - `stageN_<process>.<ext>`: full or merged artifact
//! - `stageN_<process>_<index>.<ext>`: partition artifact
//! - `stageN_<process>_*.<ext>`: partition pattern used by cleanup

use std::path::{Path, PathBuf};

use regex::Regex;

/// Builds artifact paths inside a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNaming {
    process: String,
    extension: String,
}

impl ArtifactNaming {
    pub fn new(process: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            extension: extension.into(),
        }
    }

    /// File name of the full (or merged) artifact for a stage.
    pub fn full_name(&self, stage: u8) -> String {
        format!("stage{}_{}.{}", stage, self.process, self.extension)
    }

    /// File name of one partition artifact.
    pub fn partition_name(&self, stage: u8, index: usize) -> String {
        format!("stage{}_{}_{}.{}", stage, self.process, index, self.extension)
    }

    pub fn full_path(&self, dir: &Path, stage: u8) -> PathBuf {
        dir.join(self.full_name(stage))
    }

    pub fn partition_path(&self, dir: &Path, stage: u8, index: usize) -> PathBuf {
        dir.join(self.partition_name(stage, index))
    }

    /// Pattern covering every partition artifact of a stage (`stageN_<process>_*.<ext>`),
    /// anchored on the file name.
    pub fn partition_regex(&self, stage: u8) -> Regex {
        let pattern = format!(
            "^{}_.*\\.{}$",
            regex::escape(&format!("stage{}_{}", stage, self.process)),
            regex::escape(&self.extension)
        );
        Regex::new(&pattern).expect("escaped partition pattern is a valid regex")
    }
}
