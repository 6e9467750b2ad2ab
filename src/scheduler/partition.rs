//! Event range partitioning.
//!
//! Splits `N` events into `K` contiguous, equally sized half-open ranges.
//! Every range has length `⌊N/K⌋`; the `N mod K` remainder events at the tail
//! are not assigned to any partition.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Half-open event interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventRange {
    /// First event index (inclusive).
    pub start: u64,
    /// One past the last event index.
    pub end: u64,
}

impl EventRange {
    /// Creates a range; `end` is clamped so that `end >= start`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Number of events in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Whether the range covers no events.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether two ranges share at least one event.
    pub fn overlaps(&self, other: &EventRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for EventRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Splits `total` events into exactly `workers` ranges.
///
/// # Errors
///
/// Returns `PipelineError::InvalidPartition` if `workers` is zero.
pub fn partition(total: u64, workers: usize) -> Result<Vec<EventRange>, PipelineError> {
    if workers == 0 {
        return Err(PipelineError::InvalidPartition { workers });
    }

    let per_worker = total / workers as u64;
    Ok((0..workers as u64)
        .map(|i| EventRange::new(i * per_worker, (i + 1) * per_worker))
        .collect())
}

/// Number of tail events left unassigned by [`partition`].
pub fn unassigned_events(total: u64, workers: usize) -> u64 {
    if workers == 0 {
        return total;
    }
    total % workers as u64
}
