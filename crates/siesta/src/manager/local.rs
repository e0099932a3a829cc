//! Executor that runs tasks on the tick caller's own thread

use crate::config::LocalConfig;
use crate::error::{log_sink, ErrorSink, SchedulerError, TaskFailure};
use crate::manager::{NappingSet, TickGuard, WaitQueue};
use crate::stats::{Counters, SchedulerStats};
use crate::task::Schedulable;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Fixed-capacity executor with a per-tick budget.
///
/// No threads of its own: `tick()` steps waiting tasks synchronously until
/// the queue is empty or `max_tasks_per_tick` tasks finished. A task that
/// naps goes to the napping set and is not charged to the budget.
pub struct LocalExecutor {
    config: LocalConfig,
    waiting: WaitQueue,
    napping: NappingSet,
    sink: ErrorSink,
    counters: Counters,
    ticking: AtomicBool,
}

impl LocalExecutor {
    /// Create an executor that logs task failures.
    pub fn new(config: LocalConfig) -> Self {
        Self::with_error_sink(config, log_sink())
    }

    /// Create an executor delivering unhandled task failures to `sink`.
    pub fn with_error_sink(config: LocalConfig, sink: ErrorSink) -> Self {
        Self {
            config,
            waiting: WaitQueue::default(),
            napping: NappingSet::default(),
            sink,
            counters: Counters::default(),
            ticking: AtomicBool::new(false),
        }
    }

    /// Tasks finished per tick at most (`None` = unbounded)
    pub fn budget(&self) -> Option<usize> {
        self.config.max_tasks_per_tick
    }

    /// Queue a task for a later tick.
    pub fn submit<T: Schedulable + 'static>(&self, task: Arc<T>) -> Arc<T> {
        self.counters.task_submitted();
        self.waiting.push(task.clone());
        task
    }

    /// Requeue awakened tasks, then run waiting tasks within the budget.
    pub fn tick(&self) -> Result<(), SchedulerError> {
        let _guard = TickGuard::enter(&self.ticking)?;

        self.napping.requeue_awakened(&self.waiting, &self.counters);

        let mut finished = 0;
        while self.budget().map_or(true, |budget| finished < budget) {
            let Some(task) = self.waiting.pop_ready(&self.counters) else {
                break;
            };

            match task.step() {
                Ok(true) => self.napping.insert(task),
                Ok(false) => {
                    self.counters.task_finished(task.is_failed());
                    finished += 1;
                }
                Err(error) => {
                    self.counters.task_finished(task.is_failed());
                    finished += 1;
                    (self.sink)(TaskFailure {
                        task: task.id(),
                        error,
                    });
                }
            }
        }
        Ok(())
    }

    /// Snapshot of counters and queue sizes
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            waiting: self.waiting.len(),
            napping: self.napping.len(),
            ..self.counters.snapshot()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ActionTask;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bump(count: &Arc<AtomicUsize>) -> Arc<ActionTask> {
        let count = count.clone();
        ActionTask::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_runs_task_on_tick() {
        let exec = LocalExecutor::new(LocalConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let task = exec.submit(bump(&count));
        assert!(!task.is_completed());

        exec.tick().unwrap();
        assert!(task.is_completed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tick_without_work() {
        let exec = LocalExecutor::new(LocalConfig::with_budget(3));
        exec.tick().unwrap();
        assert_eq!(exec.stats(), SchedulerStats::default());
    }

    #[test]
    fn test_nap_then_resume() {
        let exec = LocalExecutor::new(LocalConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let task = exec.submit(ActionTask::new(|task| {
            task.set_napping(true);
            Ok(())
        }));
        let c = count.clone();
        task.extend(move |_| {
            c.store(5, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        exec.tick().unwrap();
        assert!(task.is_napping());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(exec.stats().napping, 1);

        task.set_napping(false);
        exec.tick().unwrap();
        assert!(task.is_completed());
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_error_goes_to_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let exec = LocalExecutor::with_error_sink(
            LocalConfig::default(),
            Arc::new(move |failure: TaskFailure| s.lock().push(failure.to_string())),
        );
        let task = exec.submit(ActionTask::new(|_| Err(anyhow::anyhow!("local boom"))));

        exec.tick().unwrap();
        assert!(task.is_failed());
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0].ends_with("local boom"));
        assert_eq!(exec.stats().tasks_failed, 1);
    }

    #[test]
    fn test_aborted_task_is_not_run() {
        let exec = LocalExecutor::new(LocalConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let task = exec.submit(bump(&count));
        task.abort();

        exec.tick().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(task.is_completed());
        assert!(task.is_aborted());
    }
}
