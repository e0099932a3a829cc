//! Task structure and execution state

use crate::completable::Completable;
use crate::error::{ExtendError, TaskError};
use crate::task::{Schedulable, TaskId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Strategy supplying the unit type and the per-kind body of `step()`.
///
/// `drive` must keep pulling units until the task naps or
/// [`Task::take_unit`] reports that nothing is left.
pub trait WorkKind: Sized + Send + Sync + 'static {
    /// One queued piece of work
    type Unit: Send + 'static;

    /// Make as much progress as possible without running while napping.
    fn drive(task: &Task<Self>) -> Result<(), TaskError>;
}

/// Placement flags, fixed when the task is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    /// Clear queued extensions in the same critical section as `abort()`
    pub cancel_extensions_on_abort: bool,

    /// Run on a worker of its own instead of the shared pool
    pub dedicated: bool,

    /// Run on the host's tick thread
    pub host_affinity: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            cancel_extensions_on_abort: true,
            dedicated: false,
            host_affinity: false,
        }
    }
}

impl TaskOptions {
    /// Keep queued extensions when the task is aborted.
    pub fn keep_extensions_on_abort(mut self) -> Self {
        self.cancel_extensions_on_abort = false;
        self
    }

    /// Ask for a dedicated worker.
    pub fn dedicated(mut self) -> Self {
        self.dedicated = true;
        self
    }

    /// Pin to the host's tick thread.
    pub fn on_host(mut self) -> Self {
        self.host_affinity = true;
        self
    }
}

type ErrorHandler = Box<dyn FnOnce(TaskError) + Send>;

/// Mutable task fields, all behind the task's own lock
struct TaskState<K: WorkKind> {
    /// Units not yet started, in FIFO order
    extensions: VecDeque<K::Unit>,

    /// Unit suspended mid-body (stepwise tasks only)
    current: Option<K::Unit>,

    /// Bumped whenever queued work is discarded, so a unit that was out of
    /// the lock while running is not put back
    generation: u64,

    /// Explicit nap flag
    napping: bool,

    /// Forces a nap while unsatisfied
    wait_target: Option<Arc<dyn Completable>>,

    /// Receives the captured error instead of the host's sink
    error_handler: Option<ErrorHandler>,
}

/// A unit of scheduled work that can nap, be extended and be aborted.
///
/// Every public method is thread-safe. User work always runs with the task
/// lock released, so it may call back into the same task.
pub struct Task<K: WorkKind> {
    /// Unique identifier
    id: TaskId,

    /// Placement flags
    options: TaskOptions,

    /// Queue and nap state
    state: Mutex<TaskState<K>>,

    /// Every unit ran
    completed: AtomicBool,

    /// User work failed
    failed: AtomicBool,

    /// `abort()` was called
    aborted: AtomicBool,

    /// A thread is inside `step()`
    running: AtomicBool,
}

impl<K: WorkKind> Task<K> {
    /// Create a task with its first unit already queued.
    pub(crate) fn with_unit(unit: K::Unit, options: TaskOptions) -> Arc<Self> {
        let mut extensions = VecDeque::new();
        extensions.push_back(unit);
        Arc::new(Self {
            id: TaskId::new(),
            options,
            state: Mutex::new(TaskState {
                extensions,
                current: None,
                generation: 0,
                napping: false,
                wait_target: None,
                error_handler: None,
            }),
            completed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            running: AtomicBool::new(false),
        })
    }

    /// Get the Task's unique ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Placement flags
    pub fn options(&self) -> TaskOptions {
        self.options
    }

    /// Whether this task asked for its own worker
    pub fn is_dedicated(&self) -> bool {
        self.options.dedicated
    }

    /// Whether this task runs on the host's tick thread
    pub fn has_host_affinity(&self) -> bool {
        self.options.host_affinity
    }

    /// Whether `abort()` also clears queued extensions
    pub fn cancel_extensions_on_abort(&self) -> bool {
        self.options.cancel_extensions_on_abort
    }

    /// True once every queued unit has run (or the task stopped after an abort).
    /// Stays false for a failed task.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// True once user work returned an error or panicked
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// True once `abort()` was called
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Units queued but not started
    pub fn pending_extensions(&self) -> usize {
        self.state.lock().extensions.len()
    }

    /// Queue another unit behind the existing ones.
    pub(crate) fn push_extension(&self, unit: K::Unit) -> Result<(), ExtendError> {
        let mut state = self.state.lock();
        if self.is_failed() {
            return Err(ExtendError::Failed);
        }
        if self.is_aborted() {
            return Err(ExtendError::Aborted);
        }
        if self.is_completed() {
            return Err(ExtendError::Completed);
        }
        state.extensions.push_back(unit);
        Ok(())
    }

    /// Stop the task from starting further units. A unit that is already
    /// running finishes normally.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        self.aborted.store(true, Ordering::Release);
        if self.options.cancel_extensions_on_abort {
            Self::discard_queued(&mut state);
        }
    }

    /// Drop every queued unit (and a suspended body with its wait) without aborting.
    pub fn cancel_extensions(&self) {
        let mut state = self.state.lock();
        Self::discard_queued(&mut state);
    }

    fn discard_queued(state: &mut TaskState<K>) {
        state.extensions.clear();
        state.current = None;
        state.wait_target = None;
        state.generation = state.generation.wrapping_add(1);
    }

    /// Whether the task refuses to run: the explicit flag is set, or it waits
    /// on a signal that is not satisfied yet.
    pub fn is_napping(&self) -> bool {
        let target = {
            let state = self.state.lock();
            if state.napping {
                return true;
            }
            state.wait_target.clone()
        };
        target.is_some_and(|target| !target.is_satisfied())
    }

    /// Set or clear the explicit nap flag. Never clears a pending wait.
    pub fn set_napping(&self, napping: bool) {
        self.state.lock().napping = napping;
    }

    /// Route this task's error to `handler` instead of the host's sink.
    /// The handler runs on whichever thread was stepping the task.
    pub fn add_error_handler<F>(&self, handler: F)
    where
        F: FnOnce(TaskError) + Send + 'static,
    {
        self.state.lock().error_handler = Some(Box::new(handler));
    }

    /// Next queued unit. When nothing may run any more the task is marked
    /// completed and `None` is returned.
    pub(crate) fn take_unit(&self) -> Option<K::Unit> {
        self.take_unit_at_generation().map(|(unit, _)| unit)
    }

    /// [`Task::take_unit`] plus the generation read under the same lock.
    fn take_unit_at_generation(&self) -> Option<(K::Unit, u64)> {
        let mut state = self.state.lock();
        if self.is_failed() {
            return None;
        }
        if self.is_aborted() {
            self.completed.store(true, Ordering::Release);
            return None;
        }
        match state.extensions.pop_front() {
            Some(unit) => Some((unit, state.generation)),
            None => {
                self.completed.store(true, Ordering::Release);
                None
            }
        }
    }

    /// The suspended unit if there is one, else the next queued unit.
    /// Also returns the generation to hand back to [`Task::suspend_current`].
    pub(crate) fn take_current_or_next(&self) -> Option<(K::Unit, u64)> {
        let current = {
            let mut state = self.state.lock();
            if self.is_aborted() && !self.is_failed() {
                self.completed.store(true, Ordering::Release);
                return None;
            }
            state.current.take().map(|unit| (unit, state.generation))
        };
        match current {
            Some(resumed) => Some(resumed),
            None => self.take_unit_at_generation(),
        }
    }

    /// Park a unit that suspended, optionally waiting on `wait`. Nothing is
    /// kept if queued work was discarded while the unit ran.
    pub(crate) fn suspend_current(
        &self,
        unit: K::Unit,
        generation: u64,
        wait: Option<Arc<dyn Completable>>,
    ) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.current = Some(unit);
        if wait.is_some() {
            state.wait_target = wait;
        }
    }

    /// Drop any wait and the explicit nap flag.
    pub(crate) fn clear_naps(&self) {
        let mut state = self.state.lock();
        state.wait_target = None;
        state.napping = false;
    }

    /// Run one scheduling turn on the calling thread.
    ///
    /// Returns `Ok(true)` if the task stopped because it is napping and
    /// `Ok(false)` once it completed, or failed into its own error handler.
    /// An error with no handler is returned to the caller.
    pub fn step(&self) -> Result<bool, TaskError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TaskError::AlreadyRunning(self.id));
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| K::drive(self)))
            .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)));

        let result = match outcome {
            Ok(()) => Ok(!self.is_completed() && !self.is_failed()),
            Err(error) => self.fail(error),
        };

        self.running.store(false, Ordering::Release);
        result
    }

    /// Mark the task failed and deliver `error`.
    fn fail(&self, error: TaskError) -> Result<bool, TaskError> {
        let handler = {
            let mut state = self.state.lock();
            self.failed.store(true, Ordering::Release);
            state.error_handler.take()
        };

        match handler {
            Some(handler) => {
                panic::catch_unwind(AssertUnwindSafe(|| handler(error)))
                    .map_err(TaskError::from_panic)?;
                Ok(false)
            }
            None => Err(error),
        }
    }

    /// Finish an aborted task without running it again.
    pub(crate) fn retire(&self) {
        let _state = self.state.lock();
        if !self.is_failed() {
            self.completed.store(true, Ordering::Release);
        }
    }
}

impl<K: WorkKind> Completable for Task<K> {
    /// A failed task satisfies its waiters too, so they cannot hang on it.
    fn is_satisfied(&self) -> bool {
        self.is_completed() || self.is_failed()
    }

    fn task_id(&self) -> Option<TaskId> {
        Some(self.id)
    }
}

impl<K: WorkKind> Schedulable for Task<K> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn step(&self) -> Result<bool, TaskError> {
        Task::step(self)
    }

    fn is_napping(&self) -> bool {
        Task::is_napping(self)
    }

    fn is_completed(&self) -> bool {
        Task::is_completed(self)
    }

    fn is_failed(&self) -> bool {
        Task::is_failed(self)
    }

    fn is_aborted(&self) -> bool {
        Task::is_aborted(self)
    }

    fn options(&self) -> TaskOptions {
        self.options
    }

    fn retire(&self) {
        Task::retire(self)
    }
}

impl<K: WorkKind> fmt::Debug for Task<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("completed", &self.is_completed())
            .field("failed", &self.is_failed())
            .field("aborted", &self.is_aborted())
            .field("options", &self.options)
            .finish()
    }
}
