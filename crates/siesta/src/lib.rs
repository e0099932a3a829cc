//! Siesta Task Scheduling Core
//!
//! This crate provides a cooperative task scheduler that is driven from the
//! outside, one `tick()` at a time:
//! - **Tasks**: units of work that can nap, be extended while running, be
//!   aborted, and wait on any [`Completable`] (`task` module)
//! - **Workers**: one OS thread each, holding at most one task (`worker` module)
//! - **Managers**: an elastic thread pool and a fixed-budget executor that runs
//!   on the caller's own thread (`manager` module)
//! - **Scheduler**: the context handle that owns both managers (`scheduler` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use siesta::{Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//!
//! let task = scheduler.spawn(|task| {
//!     task.extend(|_| Ok(()))?;
//!     Ok(())
//! });
//!
//! // Host frame loop
//! while !task.is_completed() {
//!     scheduler.tick()?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Completion signals: the `Completable` trait, deadlines and latches
pub mod completable;

/// Pool, executor and scheduler configuration
pub mod config;

/// Error types
pub mod error;

/// Pool manager and fixed-capacity executor
pub mod manager;

/// Scheduler context handle
pub mod scheduler;

/// Counters shared by the managers and workers
pub mod stats;

/// Task state machine and its two work-unit kinds
pub mod task;

mod worker;

// ============================================================================
// Re-exports
// ============================================================================

pub use completable::{Completable, Deadline, Latch};
pub use config::{LocalConfig, PoolConfig, SchedulerConfig};
pub use error::{ErrorSink, ExtendError, SchedulerError, TaskError, TaskFailure};
pub use manager::{LocalExecutor, PoolManager};
pub use scheduler::Scheduler;
pub use stats::SchedulerStats;
pub use task::{
    Action, ActionTask, Body, Schedulable, Sequence, Signal, Step, StepTask, Stepwise, Task,
    TaskId, TaskOptions, WorkKind,
};
