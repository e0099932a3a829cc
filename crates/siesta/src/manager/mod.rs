//! Managers place tasks and run one scheduling pass per `tick()`.
//!
//! Both managers share the same bookkeeping: a FIFO [`WaitQueue`] of tasks
//! ready to run and a [`NappingSet`] of tasks that gave up their turn.

mod local;
mod pool;

pub use local::LocalExecutor;
pub use pool::PoolManager;

use crate::error::SchedulerError;
use crate::stats::Counters;
use crate::task::{Schedulable, TaskId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A task waiting for placement and when it was queued
struct Waiting {
    task: Arc<dyn Schedulable>,
    since: Instant,
}

/// Tasks ready to run, served in FIFO order
#[derive(Default)]
pub(crate) struct WaitQueue {
    inner: Mutex<VecDeque<Waiting>>,
}

impl WaitQueue {
    pub(crate) fn push(&self, task: Arc<dyn Schedulable>) {
        tracing::trace!(task = %task.id(), "task queued");
        self.inner.lock().push_back(Waiting {
            task,
            since: Instant::now(),
        });
    }

    /// Next task that may run. Aborted tasks met on the way are retired.
    pub(crate) fn pop_ready(&self, counters: &Counters) -> Option<Arc<dyn Schedulable>> {
        loop {
            let waiting = self.inner.lock().pop_front()?;
            if waiting.task.is_aborted() {
                retire_aborted(waiting.task.as_ref(), counters);
                continue;
            }
            return Some(waiting.task);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Queue length and the age of its oldest entry
    pub(crate) fn pressure(&self) -> (usize, Option<Duration>) {
        let inner = self.inner.lock();
        let oldest = inner.front().map(|waiting| waiting.since.elapsed());
        (inner.len(), oldest)
    }
}

/// Tasks parked while napping, keyed by id
#[derive(Default)]
pub(crate) struct NappingSet {
    inner: Mutex<FxHashMap<TaskId, Arc<dyn Schedulable>>>,
}

impl NappingSet {
    pub(crate) fn insert(&self, task: Arc<dyn Schedulable>) {
        tracing::trace!(task = %task.id(), "task napping");
        self.inner.lock().insert(task.id(), task);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Move every task that woke up back to `waiting`, retiring aborted ones.
    pub(crate) fn requeue_awakened(&self, waiting: &WaitQueue, counters: &Counters) {
        let mut awake = Vec::new();
        self.inner.lock().retain(|_, task| {
            if task.is_aborted() {
                retire_aborted(task.as_ref(), counters);
                return false;
            }
            if task.is_napping() {
                return true;
            }
            awake.push(task.clone());
            false
        });

        for task in awake {
            waiting.push(task);
        }
    }
}

/// Settle a task that was aborted before it could be placed again.
fn retire_aborted(task: &dyn Schedulable, counters: &Counters) {
    task.retire();
    counters.task_finished(task.is_failed());
    tracing::warn!(task = %task.id(), "aborted task dropped before placement");
}

/// Marks a manager as inside `tick()` until dropped
pub(crate) struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    pub(crate) fn enter(flag: &'a AtomicBool) -> Result<Self, SchedulerError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SchedulerError::ConcurrentTick)?;
        Ok(Self { flag })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
