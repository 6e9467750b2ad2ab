//! Per-file label consistency filtering and auditing.
//!
//! Both operations are synchronous and touch only the file they are given,
//! so any number of them can run side by side.

use std::path::{Path, PathBuf};

use arrow::compute::filter_record_batch;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::FilterError;
use crate::storage::{EventTable, EventTableError};

use super::labels::{ensure_label_fields, label_counts, one_hot_mask};

/// Result of filtering one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOutcome {
    pub output: PathBuf,
    pub kept: u64,
    pub dropped: u64,
}

/// Read-only label diagnostics for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelAudit {
    pub events: u64,
    /// Events with more than one label set.
    pub conflicts: u64,
    /// Events with no label set.
    pub unlabeled: u64,
}

impl LabelAudit {
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0 && self.unlabeled == 0
    }
}

/// Writes the events of `input` that have exactly one label set to `output`.
///
/// Every column of the input is kept, in its original order. When no event
/// survives, an empty table carrying the schema is still written.
pub fn filter_file(
    input: &Path,
    labels: &[String],
    output: &Path,
) -> Result<FilterOutcome, FilterError> {
    let table = load(input, labels)?;

    let mut kept_batches = Vec::with_capacity(table.batches().len());
    let mut kept = 0u64;
    for batch in table.batches() {
        let counts = label_counts(batch, labels, input)?;
        let mask = one_hot_mask(&counts);
        let filtered =
            filter_record_batch(batch, &mask).map_err(|e| unexpected(input, e.to_string()))?;
        kept += filtered.num_rows() as u64;
        kept_batches.push(filtered);
    }
    let dropped = table.num_events() as u64 - kept;

    if kept == 0 {
        warn!(path = %input.display(), dropped, "No clean events found after filtering");
    }

    EventTable::new(table.schema(), kept_batches)
        .write(output)
        .map_err(|e| storage_error(output, e))?;

    debug!(path = %input.display(), output = %output.display(), kept, dropped, "File filtered");

    Ok(FilterOutcome {
        output: output.to_path_buf(),
        kept,
        dropped,
    })
}

/// Counts conflicting and unlabeled events of `input` without writing anything.
pub fn audit_file(input: &Path, labels: &[String]) -> Result<LabelAudit, FilterError> {
    let table = load(input, labels)?;

    let mut audit = LabelAudit {
        events: table.num_events() as u64,
        conflicts: 0,
        unlabeled: 0,
    };
    for batch in table.batches() {
        for count in label_counts(batch, labels, input)? {
            match count {
                0 => audit.unlabeled += 1,
                1 => {}
                _ => audit.conflicts += 1,
            }
        }
    }

    Ok(audit)
}

fn load(input: &Path, labels: &[String]) -> Result<EventTable, FilterError> {
    if labels.is_empty() {
        return Err(unexpected(input, "no label fields given".to_string()));
    }

    let table = EventTable::read(input).map_err(|e| storage_error(input, e))?;
    ensure_label_fields(&table.schema(), labels, input)?;

    if table.num_events() == 0 {
        return Err(FilterError::EmptyInput {
            path: input.to_path_buf(),
        });
    }
    Ok(table)
}

fn storage_error(path: &Path, err: EventTableError) -> FilterError {
    unexpected(path, err.to_string())
}

fn unexpected(path: &Path, message: String) -> FilterError {
    FilterError::Unexpected {
        path: path.to_path_buf(),
        message,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::storage::event_table::test_support::labelled_table;

    pub const LABELS: [&str; 3] = ["process_isHBB", "process_isHGG", "process_isQQ"];

    pub fn labels() -> Vec<String> {
        LABELS.iter().map(|s| s.to_string()).collect()
    }

    /// Ten events: one label on 0,2,4,6,7,8,9; two labels on 1 and 3; none on 5.
    pub fn write_ten_event_file(path: &Path) {
        labelled_table(
            &(0..10).collect::<Vec<u64>>(),
            &[
                (
                    LABELS[0],
                    vec![true, true, false, false, false, false, true, false, false, true],
                ),
                (
                    LABELS[1],
                    vec![false, true, true, true, false, false, false, true, false, false],
                ),
                (
                    LABELS[2],
                    vec![false, false, false, true, true, false, false, false, true, false],
                ),
            ],
        )
        .write(path)
        .unwrap();
    }
}
