//! Worker thread that steps one Task at a time
//!
//! A worker owns one OS thread for its whole life. The manager hands it a
//! task, the thread steps it until it finishes, and while the task naps the
//! manager may take it back and give the worker something else.

use crate::error::{SchedulerError, TaskFailure};
use crate::stats::Counters;
use crate::task::Schedulable;
use crossbeam::channel::Sender;
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long an idle worker sleeps once spinning and yielding gave up
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// The task held by a worker
#[derive(Default)]
struct Slot {
    task: Option<Arc<dyn Schedulable>>,

    /// The worker thread is inside `step()` of `task`
    stepping: bool,
}

/// State shared between the manager-side handle and the worker thread
struct WorkerShared {
    slot: Mutex<Slot>,
    shutdown: AtomicBool,
    failures: Sender<TaskFailure>,
    counters: Arc<Counters>,
}

/// Handle to a worker thread
pub(crate) struct Worker {
    /// Worker ID
    id: usize,

    shared: Arc<WorkerShared>,

    /// Worker thread handle
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    /// Start an idle worker thread.
    pub(crate) fn spawn(
        id: usize,
        failures: Sender<TaskFailure>,
        counters: Arc<Counters>,
    ) -> Result<Self, SchedulerError> {
        let shared = Arc::new(WorkerShared {
            slot: Mutex::new(Slot::default()),
            shutdown: AtomicBool::new(false),
            failures,
            counters,
        });

        let thread_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(format!("siesta-worker-{}", id))
            .spawn(move || Worker::run_loop(thread_shared))?;

        tracing::debug!(worker = id, "worker started");
        Ok(Self {
            id,
            shared,
            handle: Some(handle),
        })
    }

    /// Start a worker already holding `task`.
    pub(crate) fn spawn_with(
        id: usize,
        task: Arc<dyn Schedulable>,
        failures: Sender<TaskFailure>,
        counters: Arc<Counters>,
    ) -> Result<Self, SchedulerError> {
        let worker = Self::spawn(id, failures, counters)?;
        worker.assign(task)?;
        Ok(worker)
    }

    /// Get the worker ID
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Whether the worker holds a task
    pub(crate) fn is_occupied(&self) -> bool {
        self.shared.slot.lock().task.is_some()
    }

    /// Hand a task to this worker.
    pub(crate) fn assign(&self, task: Arc<dyn Schedulable>) -> Result<(), SchedulerError> {
        let mut slot = self.shared.slot.lock();
        if slot.task.is_some() {
            return Err(SchedulerError::WorkerOccupied(self.id));
        }
        tracing::trace!(worker = self.id, task = %task.id(), "task assigned");
        slot.task = Some(task);
        Ok(())
    }

    /// Detach the held task iff it is napping and not being stepped right now.
    pub(crate) fn take_back_if_napping(&self) -> Option<Arc<dyn Schedulable>> {
        let mut slot = self.shared.slot.lock();
        if slot.stepping {
            return None;
        }
        let napping = slot.task.as_ref().is_some_and(|task| task.is_napping());
        if napping {
            slot.task.take()
        } else {
            None
        }
    }

    /// Stop the worker thread and wait for it. A unit that is running
    /// finishes first.
    pub(crate) fn stop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(worker = self.id, "worker thread panicked");
            }
            tracing::debug!(worker = self.id, "worker stopped");
        }
    }

    /// Worker thread main loop
    fn run_loop(shared: Arc<WorkerShared>) {
        let backoff = Backoff::new();

        while !shared.shutdown.load(Ordering::Acquire) {
            let task = {
                let mut slot = shared.slot.lock();
                match &slot.task {
                    Some(task) if !task.is_napping() => {
                        let task = task.clone();
                        slot.stepping = true;
                        Some(task)
                    }
                    _ => None,
                }
            };

            let Some(task) = task else {
                if backoff.is_completed() {
                    thread::sleep(IDLE_SLEEP);
                } else {
                    backoff.snooze();
                }
                continue;
            };
            backoff.reset();

            let finished = match task.step() {
                Ok(napping) => !napping,
                Err(error) => {
                    // Nobody is left to receive failures once the manager is gone
                    let _ = shared.failures.send(TaskFailure {
                        task: task.id(),
                        error,
                    });
                    true
                }
            };
            if finished {
                shared.counters.task_finished(task.is_failed());
            }

            let mut slot = shared.slot.lock();
            slot.stepping = false;
            if finished {
                slot.task = None;
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
