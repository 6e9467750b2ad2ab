//! Columnar event storage.
//!
//! Event artifacts handled in-process (label filter input/output, in-process
//! merge, in-process event counting) are Parquet files with one row per event.
//!
//! # Usage
//!
//! ```rust,ignore
//! use event_stager::storage::{count_events, EventTable};
//!
//! let n = count_events(Path::new("tmp/stage1_Hbb.parquet"))?;
//! let table = EventTable::read(Path::new("tmp/stage2_Hbb.parquet"))?;
//! ```

pub mod event_table;

pub use event_table::{concat_tables, count_events, EventTable, EventTableError};
