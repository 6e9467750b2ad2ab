//! One-hot label evaluation over record batches.
//!
//! Each event carries an ordered set of label fields, each of which is a
//! flag. Boolean columns are used as-is; numeric columns are cast so that
//! any non-zero value means set. A label therefore contributes at most one
//! to an event's count: a single field holding `2` is one set label, not a
//! conflict. Null entries count as unset.

use std::path::Path;

use arrow::array::{Array, BooleanArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::FilterError;

/// Label fields written by the reduction jobs, one per process.
pub const DEFAULT_LABEL_FIELDS: [&str; 18] = [
    "process_isHLNUQQ",
    "process_isHQQLNU",
    "process_isENUEQQ",
    "process_isEEQQ",
    "process_isMUNUMUQQ",
    "process_isMUMUQQ",
    "process_isTAUNUTAUQQ",
    "process_isTAUTAUQQ",
    "process_isHTAUTAU",
    "process_isHLLNUNU",
    "process_isEENUNU",
    "process_isMUMUNUNU",
    "process_isTAUTAUNUNU",
    "process_isL1L2NUNU",
    "process_isTAUTAU",
    "process_isHGG",
    "process_isHBB",
    "process_isQQ",
];

/// Returns the default label list as owned strings.
pub fn default_label_fields() -> Vec<String> {
    DEFAULT_LABEL_FIELDS.iter().map(|s| s.to_string()).collect()
}

/// Fails with `MissingField` naming the first label absent from `schema`.
pub fn ensure_label_fields(
    schema: &Schema,
    labels: &[String],
    path: &Path,
) -> Result<(), FilterError> {
    match labels.iter().find(|l| schema.index_of(l).is_err()) {
        Some(missing) => Err(FilterError::MissingField {
            path: path.to_path_buf(),
            field: missing.clone(),
        }),
        None => Ok(()),
    }
}

/// Number of set labels per event in `batch`.
pub fn label_counts(
    batch: &RecordBatch,
    labels: &[String],
    path: &Path,
) -> Result<Vec<u32>, FilterError> {
    let mut counts = vec![0u32; batch.num_rows()];

    for label in labels {
        let column = batch
            .column_by_name(label)
            .ok_or_else(|| FilterError::MissingField {
                path: path.to_path_buf(),
                field: label.clone(),
            })?;

        let as_bool = cast(column, &DataType::Boolean).map_err(|e| FilterError::Unexpected {
            path: path.to_path_buf(),
            message: format!("label '{}' is not boolean-like: {}", label, e),
        })?;
        let values = as_bool
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| FilterError::Unexpected {
                path: path.to_path_buf(),
                message: format!("label '{}' did not cast to boolean", label),
            })?;

        for (count, value) in counts.iter_mut().zip(values.iter()) {
            if value == Some(true) {
                *count += 1;
            }
        }
    }

    Ok(counts)
}

/// Selection mask keeping events with exactly one label set.
pub fn one_hot_mask(counts: &[u32]) -> BooleanArray {
    counts.iter().map(|c| Some(*c == 1)).collect()
}
