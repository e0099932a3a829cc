//! Resumable-body tasks
//!
//! A [`Body`] is advanced one step at a time and reports how it suspended.
//! Suspending on a [`Completable`] makes the task nap until that signal is
//! satisfied; the body then resumes where it left off on a later `step()`.

use crate::completable::{Completable, Deadline};
use crate::error::{ExtendError, TaskError};
use crate::task::{Task, TaskOptions, WorkKind};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How a body suspended
#[derive(Clone)]
pub enum Signal {
    /// Checkpoint. The task keeps running unless it was napped or aborted.
    Continue,

    /// Nap until the target is satisfied
    WaitOn(Arc<dyn Completable>),
}

impl Signal {
    /// Wait for `target`.
    pub fn wait_on<C: Completable + 'static>(target: Arc<C>) -> Self {
        Signal::WaitOn(target)
    }

    /// Nap for at least `duration`.
    pub fn nap_for(duration: Duration) -> Self {
        Signal::WaitOn(Arc::new(Deadline::after(duration)))
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Continue => f.write_str("Continue"),
            Signal::WaitOn(target) => f
                .debug_struct("WaitOn")
                .field("satisfied", &target.is_satisfied())
                .finish(),
        }
    }
}

/// Result of advancing a body once
#[derive(Debug, Clone)]
pub enum Step {
    /// The body has more to do
    Suspend(Signal),

    /// The body ran to its end
    Finished,
}

/// A resumable unit of work.
///
/// Any `FnMut(&StepTask) -> anyhow::Result<Step>` closure is a body; keep
/// the progress in captured state.
pub trait Body: Send + 'static {
    /// Advance to the next suspension point.
    fn resume(&mut self, task: &StepTask) -> anyhow::Result<Step>;
}

impl<F> Body for F
where
    F: FnMut(&StepTask) -> anyhow::Result<Step> + Send + 'static,
{
    fn resume(&mut self, task: &StepTask) -> anyhow::Result<Step> {
        self(task)
    }
}

type Stage = Box<dyn FnOnce(&StepTask) -> anyhow::Result<Option<Signal>> + Send>;

/// A body built from ordered stages.
///
/// Each stage runs once. A stage returning `Some(signal)` suspends the body
/// there; `None` falls through to the next stage.
#[derive(Default)]
pub struct Sequence {
    stages: VecDeque<Stage>,
}

impl Sequence {
    /// Empty sequence
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn then<F>(mut self, stage: F) -> Self
    where
        F: FnOnce(&StepTask) -> anyhow::Result<Option<Signal>> + Send + 'static,
    {
        self.stages.push_back(Box::new(stage));
        self
    }

    /// Stages not run yet
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

impl Body for Sequence {
    fn resume(&mut self, task: &StepTask) -> anyhow::Result<Step> {
        while let Some(stage) = self.stages.pop_front() {
            if let Some(signal) = stage(task)? {
                return Ok(Step::Suspend(signal));
            }
        }
        Ok(Step::Finished)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("remaining", &self.stages.len())
            .finish()
    }
}

/// Work kind for [`StepTask`]
#[derive(Debug)]
pub enum Stepwise {}

/// A task whose units are resumable bodies
pub type StepTask = Task<Stepwise>;

impl WorkKind for Stepwise {
    type Unit = Box<dyn Body>;

    fn drive(task: &StepTask) -> Result<(), TaskError> {
        while !task.is_napping() {
            let Some((mut body, generation)) = task.take_current_or_next() else {
                break;
            };
            match body.resume(task)? {
                Step::Finished => {}
                Step::Suspend(Signal::Continue) => {
                    task.suspend_current(body, generation, None);
                }
                Step::Suspend(Signal::WaitOn(target)) => {
                    if target.task_id() == Some(task.id()) {
                        return Err(TaskError::WaitOnSelf);
                    }
                    task.suspend_current(body, generation, Some(target));
                }
            }
        }
        Ok(())
    }
}

impl Task<Stepwise> {
    /// Create a stepwise task with default options.
    pub fn new<B: Body>(body: B) -> Arc<Self> {
        Self::with_options(body, TaskOptions::default())
    }

    /// Create a stepwise task with explicit placement flags.
    pub fn with_options<B: Body>(body: B, options: TaskOptions) -> Arc<Self> {
        Self::with_unit(Box::new(body), options)
    }

    /// Queue another body to start after the current one finishes.
    pub fn extend<B: Body>(&self, body: B) -> Result<(), ExtendError> {
        self.push_extension(Box::new(body))
    }

    /// Wake the task now, dropping its wait target whether it is satisfied
    /// or not, and clearing the nap flag.
    pub fn force_wake(&self) {
        self.clear_naps();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completable::Latch;
    use crate::task::ActionTask;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn cell(v: i64) -> Arc<AtomicI64> {
        Arc::new(AtomicI64::new(v))
    }

    /// `x = 6; wait on other; x += 1; yield; x += 1`
    fn wait_then_bump(x: Arc<AtomicI64>, other: Arc<ActionTask>) -> Sequence {
        let (x1, x2, x3) = (x.clone(), x.clone(), x);
        Sequence::new()
            .then(move |_| {
                x1.store(6, Ordering::SeqCst);
                Ok(Some(Signal::wait_on(other)))
            })
            .then(move |_| {
                x2.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Signal::Continue))
            })
            .then(move |_| {
                x3.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
    }

    #[test]
    fn test_continue_does_not_nap() {
        let x = cell(0);
        let x2 = x.clone();
        let mut yielded = false;
        let task = StepTask::new(move |_: &StepTask| -> anyhow::Result<Step> {
            if !yielded {
                yielded = true;
                return Ok(Step::Suspend(Signal::Continue));
            }
            x2.store(5, Ordering::SeqCst);
            Ok(Step::Finished)
        });

        assert!(!task.is_completed());
        assert!(!task.step().unwrap());
        assert_eq!(x.load(Ordering::SeqCst), 5);
        assert!(task.is_completed());
    }

    #[test]
    fn test_waits_on_other_task() {
        let x = cell(0);
        let other = ActionTask::new(|_| Ok(()));
        let task = StepTask::new(wait_then_bump(x.clone(), other.clone()));

        assert!(task.step().unwrap());
        assert!(task.is_napping());
        assert!(!task.is_completed());
        assert_eq!(x.load(Ordering::SeqCst), 6);

        other.step().unwrap();
        assert!(!task.is_napping());
        assert!(!task.step().unwrap());
        assert_eq!(x.load(Ordering::SeqCst), 8);
        assert!(task.is_completed());
    }

    #[test]
    fn test_step_while_waiting_does_nothing() {
        let x = cell(0);
        let latch = Arc::new(Latch::new());
        let l = latch.clone();
        let x2 = x.clone();
        let task = StepTask::new(
            Sequence::new()
                .then(move |_| Ok(Some(Signal::wait_on(l))))
                .then(move |_| {
                    x2.store(1, Ordering::SeqCst);
                    Ok(None)
                }),
        );

        assert!(task.step().unwrap());
        assert!(task.step().unwrap());
        assert_eq!(x.load(Ordering::SeqCst), 0);

        latch.release();
        assert!(!task.step().unwrap());
        assert_eq!(x.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_force_wake_overrides_wait() {
        let x = cell(0);
        let never = Arc::new(Latch::new());
        let x2 = x.clone();
        let task = StepTask::new(
            Sequence::new()
                .then(move |_| Ok(Some(Signal::wait_on(never))))
                .then(move |_| {
                    x2.store(3, Ordering::SeqCst);
                    Ok(None)
                }),
        );

        assert!(task.step().unwrap());
        task.force_wake();
        assert!(!task.is_napping());
        assert!(!task.step().unwrap());
        assert_eq!(x.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_set_napping_false_keeps_wait() {
        let latch = Arc::new(Latch::new());
        let l = latch.clone();
        let task = StepTask::new(Sequence::new().then(move |_| Ok(Some(Signal::wait_on(l)))));

        task.step().unwrap();
        task.set_napping(false);
        assert!(task.is_napping());
        latch.release();
        assert!(!task.is_napping());
    }

    #[test]
    fn test_nap_for_deadline() {
        let task = StepTask::new(
            Sequence::new().then(|_| Ok(Some(Signal::nap_for(Duration::from_millis(20))))),
        );
        assert!(task.step().unwrap());
        std::thread::sleep(Duration::from_millis(30));
        assert!(!task.is_napping());
        assert!(!task.step().unwrap());
        assert!(task.is_completed());
    }

    #[test]
    fn test_nap_for_unbounded_duration() {
        let task = StepTask::new(
            Sequence::new()
                .then(|_| Ok(Some(Signal::nap_for(Duration::MAX))))
                .then(|_| Ok(None)),
        );
        assert!(task.step().unwrap());
        assert!(task.is_napping());
        assert!(!task.is_failed());

        task.force_wake();
        assert!(!task.step().unwrap());
        assert!(task.is_completed());
    }

    #[test]
    fn test_cancel_after_dequeue_discards_body() {
        let task = StepTask::new(Sequence::new().then(|_| Ok(Some(Signal::Continue))));

        let (body, generation) = task.take_current_or_next().unwrap();
        task.cancel_extensions();
        task.suspend_current(body, generation, None);

        assert!(task.take_current_or_next().is_none());
        assert!(task.is_completed());
    }

    #[test]
    fn test_wait_on_self_fails() {
        let holder: Arc<parking_lot::Mutex<Option<Arc<StepTask>>>> =
            Arc::new(parking_lot::Mutex::new(None));
        let h = holder.clone();
        let task = StepTask::new(move |_: &StepTask| -> anyhow::Result<Step> {
            let me = h.lock().clone().expect("handle installed");
            Ok(Step::Suspend(Signal::wait_on(me)))
        });
        *holder.lock() = Some(task.clone());

        assert!(matches!(task.step(), Err(TaskError::WaitOnSelf)));
        assert!(task.is_failed());
        holder.lock().take();
    }

    #[test]
    fn test_extensions_run_after_body() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());
        let task = StepTask::new(
            Sequence::new()
                .then(move |_| {
                    l1.lock().push("first");
                    Ok(Some(Signal::Continue))
                })
                .then(|_| Ok(None)),
        );
        task.extend(Sequence::new().then(move |_| {
            l2.lock().push("second");
            Ok(None)
        }))
        .unwrap();

        assert!(!task.step().unwrap());
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_cancel_while_waiting_drops_body() {
        let x = cell(0);
        let never = Arc::new(Latch::new());
        let x2 = x.clone();
        let task = StepTask::new(
            Sequence::new()
                .then(move |_| Ok(Some(Signal::wait_on(never))))
                .then(move |_| {
                    x2.store(1, Ordering::SeqCst);
                    Ok(None)
                }),
        );

        assert!(task.step().unwrap());
        task.cancel_extensions();
        assert!(!task.is_napping());
        assert!(!task.step().unwrap());
        assert!(task.is_completed());
        assert_eq!(x.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abort_mid_body() {
        let x = cell(0);
        let x2 = x.clone();
        let task = StepTask::new(
            Sequence::new()
                .then(|task| {
                    task.abort();
                    Ok(Some(Signal::Continue))
                })
                .then(move |_| {
                    x2.store(1, Ordering::SeqCst);
                    Ok(None)
                }),
        );

        assert!(!task.step().unwrap());
        assert!(task.is_aborted());
        assert!(task.is_completed());
        assert_eq!(x.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_body_error_fails_task() {
        let task = StepTask::new(|_: &StepTask| -> anyhow::Result<Step> {
            anyhow::bail!("body broke")
        });
        let err = task.step().unwrap_err();
        assert_eq!(err.to_string(), "body broke");
        assert!(task.is_failed());
    }
}
