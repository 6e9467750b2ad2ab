//! event-stager: two-stage event reduction pipeline and label consistency filter.
//!
//! This library drives a full-dataset reduction job, fans the result out to
//! parallel per-range jobs, merges their outputs, and filters reduced files
//! down to events carrying exactly one process label.

// Core modules
pub mod cli;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod quality;
pub mod scheduler;
pub mod storage;

// Re-export commonly used error types
pub use error::{FilterError, PipelineError};
