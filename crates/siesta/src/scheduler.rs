//! Scheduler context handle
//!
//! Owns one [`PoolManager`] and one [`LocalExecutor`]. Tasks reach a manager
//! through this handle, so nothing in the crate depends on global state.

use crate::config::SchedulerConfig;
use crate::error::{log_sink, ErrorSink, SchedulerError};
use crate::manager::{LocalExecutor, PoolManager};
use crate::stats::SchedulerStats;
use crate::task::{ActionTask, Body, Schedulable, StepTask, TaskOptions};
use std::sync::Arc;

/// Entry point for submitting tasks and driving them with `tick()`
pub struct Scheduler {
    pool: PoolManager,
    local: LocalExecutor,
}

impl Scheduler {
    /// Create a scheduler that logs unhandled task failures.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::with_error_sink(config, log_sink())
    }

    /// Create a scheduler delivering unhandled task failures to `sink`,
    /// always on the thread calling [`Scheduler::tick`].
    pub fn with_error_sink(
        config: SchedulerConfig,
        sink: ErrorSink,
    ) -> Result<Self, SchedulerError> {
        let pool = PoolManager::with_error_sink(config.pool, sink.clone())?;
        let local = LocalExecutor::with_error_sink(config.local, sink);
        Ok(Self { pool, local })
    }

    // ===== Callback tasks =====

    /// Run `f` on the worker pool.
    pub fn spawn<F>(&self, f: F) -> Arc<ActionTask>
    where
        F: FnOnce(&ActionTask) -> anyhow::Result<()> + Send + 'static,
    {
        self.pool.submit(ActionTask::new(f))
    }

    /// Run `f` on the thread that calls `tick()`.
    pub fn spawn_local<F>(&self, f: F) -> Arc<ActionTask>
    where
        F: FnOnce(&ActionTask) -> anyhow::Result<()> + Send + 'static,
    {
        self.local
            .submit(ActionTask::with_options(f, TaskOptions::default().on_host()))
    }

    /// Run `f` on a worker of its own, started immediately.
    pub fn spawn_dedicated<F>(&self, f: F) -> Result<Arc<ActionTask>, SchedulerError>
    where
        F: FnOnce(&ActionTask) -> anyhow::Result<()> + Send + 'static,
    {
        self.pool
            .submit_dedicated(ActionTask::with_options(f, TaskOptions::default().dedicated()))
    }

    // ===== Resumable bodies =====

    /// Run `body` on the worker pool.
    pub fn spawn_steps<B: Body>(&self, body: B) -> Arc<StepTask> {
        self.pool.submit(StepTask::new(body))
    }

    /// Run `body` on the thread that calls `tick()`.
    pub fn spawn_local_steps<B: Body>(&self, body: B) -> Arc<StepTask> {
        self.local
            .submit(StepTask::with_options(body, TaskOptions::default().on_host()))
    }

    /// Run `body` on a worker of its own, started immediately.
    pub fn spawn_dedicated_steps<B: Body>(&self, body: B) -> Result<Arc<StepTask>, SchedulerError> {
        self.pool
            .submit_dedicated(StepTask::with_options(body, TaskOptions::default().dedicated()))
    }

    /// Place a task built elsewhere according to its options: host-affine
    /// tasks go to the local executor, dedicated ones get their own worker,
    /// everything else joins the pool queue.
    pub fn submit<T: Schedulable + 'static>(&self, task: Arc<T>) -> Result<Arc<T>, SchedulerError> {
        let options = task.options();
        if options.host_affinity {
            Ok(self.local.submit(task))
        } else if options.dedicated {
            self.pool.submit_dedicated(task)
        } else {
            Ok(self.pool.submit(task))
        }
    }

    /// One scheduling pass: the pool first, then the local executor.
    pub fn tick(&self) -> Result<(), SchedulerError> {
        self.pool.tick()?;
        self.local.tick()
    }

    /// The worker pool
    pub fn pool(&self) -> &PoolManager {
        &self.pool
    }

    /// The executor running on the tick thread
    pub fn local(&self) -> &LocalExecutor {
        &self.local
    }

    /// Workers the pool keeps alive even when idle
    pub fn min_workers(&self) -> usize {
        self.pool.config().min_workers
    }

    /// Upper bound on general workers
    pub fn max_workers(&self) -> usize {
        self.pool.config().max_workers
    }

    /// Combined statistics of both managers
    pub fn stats(&self) -> SchedulerStats {
        self.pool.stats().merge(&self.local.stats())
    }

    /// Stop every worker thread. Host-affine tasks can still be ticked.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
