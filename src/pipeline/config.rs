//! Pipeline configuration for the orchestrator.
//!
//! This module provides configuration options for a reduction run: the
//! directories involved, worker count, run mode, artifact naming and the
//! external job templates.

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::templates::JobTemplates;

/// Default working directory for transient artifacts.
const DEFAULT_WORK_DIR: &str = "./tmp";

/// Default artifact extension, matching the external reduction tools.
const DEFAULT_ARTIFACT_EXTENSION: &str = "root";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The sample name does not follow the expected naming pattern.
    #[error("Could not extract process from sample name: {0}")]
    UnparsableSample(String),

    /// The process is not part of the catalog.
    #[error("Process '{process}' (from sample '{sample}') is not in the process catalog")]
    UnknownProcess { sample: String, process: String },

    /// An environment variable or template has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which part of the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Full-dataset reduction only.
    Stage1,
    /// Partitioned reduction, merge and cleanup.
    Stage2,
    /// Stage1 followed by stage2.
    Both,
    /// Delete all transient state.
    Clean,
}

impl RunMode {
    pub fn runs_stage1(&self) -> bool {
        matches!(self, RunMode::Stage1 | RunMode::Both)
    }

    pub fn runs_stage2(&self) -> bool {
        matches!(self, RunMode::Stage2 | RunMode::Both)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Stage1 => write!(f, "stage1"),
            RunMode::Stage2 => write!(f, "stage2"),
            RunMode::Both => write!(f, "both"),
            RunMode::Clean => write!(f, "clean"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    /// Accepts the numeric options (1-4) as well as the mode names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "stage1" => Ok(RunMode::Stage1),
            "2" | "stage2" => Ok(RunMode::Stage2),
            "3" | "both" | "all" => Ok(RunMode::Both),
            "4" | "clean" => Ok(RunMode::Clean),
            other => Err(format!(
                "Unknown mode: {} (expected 1=stage1, 2=stage2, 3=both, 4=clean)",
                other
            )),
        }
    }
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the per-sample event files.
    pub input_dir: PathBuf,
    /// Directory receiving the merged stage2 artifact.
    pub output_dir: PathBuf,
    /// Working directory for transient artifacts; owned by a single run.
    pub work_dir: PathBuf,
    /// Worker count `K`: pool size and number of partitions.
    pub workers: usize,
    /// Which stages to run.
    pub mode: RunMode,
    /// Artifact file extension without the dot.
    pub artifact_extension: String,
    /// External job templates.
    pub job_templates: JobTemplates,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("./output"),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            workers: 64,
            mode: RunMode::Both,
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
            job_templates: JobTemplates::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides fields from environment variables, leaving the rest untouched.
    ///
    /// # Environment Variables
    ///
    /// - `STAGER_WORK_DIR`: Working directory (default: ./tmp)
    /// - `STAGER_WORKERS`: Worker count (default: 64)
    /// - `STAGER_ARTIFACT_EXT`: Artifact extension (default: root)
    /// - `STAGER_JOBS_FILE`: YAML file with job templates
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("STAGER_WORK_DIR") {
            self.work_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("STAGER_WORKERS") {
            self.workers = parse_env_value(&val, "STAGER_WORKERS")?;
        }

        if let Ok(val) = std::env::var("STAGER_ARTIFACT_EXT") {
            self.artifact_extension = val;
        }

        if let Ok(val) = std::env::var("STAGER_JOBS_FILE") {
            self.job_templates = JobTemplates::from_yaml_file(&PathBuf::from(val))?;
        }

        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "workers must be greater than 0".to_string(),
            ));
        }

        if self.work_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "work_dir cannot be empty".to_string(),
            ));
        }

        if same_directory(&self.output_dir, &self.work_dir) {
            return Err(ConfigError::ValidationFailed(format!(
                "output_dir {} resolves to work_dir {}",
                self.output_dir.display(),
                self.work_dir.display()
            )));
        }

        if self.artifact_extension.is_empty() || self.artifact_extension.contains('.') {
            return Err(ConfigError::ValidationFailed(
                "artifact_extension must be a non-empty extension without dots".to_string(),
            ));
        }

        self.job_templates.validate()
    }

    /// Builder method to set the input directory.
    pub fn with_input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = dir.into();
        self
    }

    /// Builder method to set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Builder method to set the working directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Builder method to set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Builder method to set the run mode.
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder method to set the artifact extension.
    pub fn with_artifact_extension(mut self, ext: impl Into<String>) -> Self {
        self.artifact_extension = ext.into();
        self
    }

    /// Builder method to set the job templates.
    pub fn with_job_templates(mut self, templates: JobTemplates) -> Self {
        self.job_templates = templates;
        self
    }
}

/// Resolves `path` component by component.
///
/// Every prefix that exists is canonicalised, so symlinks and `..` follow
/// the filesystem; the part that does not exist yet is normalised lexically.
fn resolve_dir(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => {
                resolved.push(other);
                if let Ok(canonical) = resolved.canonicalize() {
                    resolved = canonical;
                }
            }
        }
    }
    resolved
}

/// Whether two directory paths name the same location once resolved.
pub(crate) fn same_directory(a: &Path, b: &Path) -> bool {
    resolve_dir(a) == resolve_dir(b)
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
