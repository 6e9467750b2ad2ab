//! Label consistency filtering for reduced event files.
//!
//! Healthy events carry exactly one true label field. This module drops the
//! events that violate that invariant and reports, per file, how many events
//! are conflicting (several labels) or unlabeled (none).

mod batch;
mod filter;
mod labels;

pub use batch::{
    filtered_output_path, AuditReport, FilterReport, LabelFilter, DEFAULT_AUDIT_CONCURRENCY,
    DEFAULT_FILTER_CONCURRENCY,
};
pub use filter::{audit_file, filter_file, FilterOutcome, LabelAudit};
pub use labels::{default_label_fields, label_counts, one_hot_mask, DEFAULT_LABEL_FIELDS};
