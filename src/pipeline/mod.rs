//! Pipeline orchestration for the two-stage event reduction.
//!
//! # Architecture
//!
//! The pipeline consists of several components:
//!
//! - **Orchestrator**: drives stage1, then partitions, dispatches, merges and cleans up stage2
//! - **Catalog**: resolves sample names into processes
//! - **Templates**: typed argv templates for the external tools
//! - **Counter / Merge**: pluggable collaborators for event counts and merging
//! - **Cleanup**: removal of transient artifacts
//!
//! # Pipeline Flow
//!
//! 1. **Resolution**: the sample is mapped to a process; unknown samples fail before any job starts
//! 2. **Stage1**: one full-dataset job writes `stage1_<process>.<ext>` into the working directory
//! 3. **Partitioning**: the stage1 event count is split into `K` equal ranges
//! 4. **Workers**: one stage2 job per non-empty range runs under a pool of size `K`
//! 5. **Merge**: the partition artifacts are concatenated once every job succeeded
//! 6. **Copy and cleanup**: the merged artifact is copied to the output directory and
//!    transient files are removed
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use event_stager::pipeline::{PipelineConfig, PipelineOrchestrator, ProcessCatalog, RunMode};
//!
//! let config = PipelineConfig::new()
//!     .with_input_dir("/eos/experiment/fcc/ee/generation/DelphesEvents/winter2023/IDEA")
//!     .with_output_dir("./output")
//!     .with_workers(64)
//!     .with_mode(RunMode::Both);
//!
//! let orchestrator = PipelineOrchestrator::new(config, Arc::new(ProcessCatalog::default()))?;
//! let report = orchestrator.run("wzp6_ee_Hlnuqq_ecm125").await?;
//! ```

pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod counter;
pub mod merge;
pub mod naming;
pub mod orchestrator;
pub mod templates;

// Re-export main types for convenience
pub use catalog::{Dataset, ProcessCatalog, DEFAULT_PROCESSES};
pub use cleanup::{clean_work_dir, cleanup_stage2, CleanupSummary};
pub use config::{ConfigError, PipelineConfig, RunMode};
pub use counter::{CommandEventCounter, EventCounter, ParquetEventCounter};
pub use merge::{merge_partitions, CommandMerger, Merger, ParquetMerger};
pub use naming::ArtifactNaming;
pub use orchestrator::{PipelineOrchestrator, PipelineState, RunReport};
pub use templates::{root_count_template, CommandTemplate, JobTemplates, TemplateVars};
