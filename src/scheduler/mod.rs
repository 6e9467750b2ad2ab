//! Partitioned fan-out of stage2 work.
//!
//! This module provides the infrastructure for splitting a stage1 artifact
//! into event ranges and running one external job per range:
//!
//! - **partition**: pure `(N, K) → K ranges` splitter
//! - **Job**: job descriptors and results
//! - **WorkerPool**: bounded-concurrency pool, shared with the label filter
//!
//! # Architecture
//!
//! ```text
//!                 ┌───────────────────┐
//!                 │  stage1 artifact  │  N events
//!                 └─────────┬─────────┘
//!                           │ partition(N, K)
//!         ┌─────────────────┼─────────────────┐
//!         ▼                 ▼                 ▼
//!    ┌─────────┐       ┌─────────┐       ┌─────────┐
//!    │ job 0   │       │ job 1   │  ...  │ job K-1 │
//!    └────┬────┘       └────┬────┘       └────┬────┘
//!         └─────────────────┼─────────────────┘
//!                           ▼
//!                    full-barrier join
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use event_stager::scheduler::{partition, WorkerPool, WorkerPoolConfig};
//!
//! let ranges = partition(1_000, 4)?;
//! let pool = WorkerPool::new(WorkerPoolConfig::new(4).with_name("stage2"))?;
//! let results = pool.dispatch_jobs(jobs, launcher).await;
//! ```

pub mod job;
pub mod partition;
pub mod worker_pool;

pub use job::{JobResult, JobSpec, JobStatus};
pub use partition::{partition, unassigned_events, EventRange};
pub use worker_pool::{PoolError, PoolOutcome, PoolStats, WorkerPool, WorkerPoolConfig};
