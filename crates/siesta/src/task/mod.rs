//! Tasks: the state machine shared by every work-unit kind.
//!
//! A [`Task`] owns a FIFO queue of work units. The unit type is chosen by a
//! [`WorkKind`]: [`Action`] tasks run one-shot callbacks, [`Stepwise`] tasks
//! run resumable bodies that can suspend on a [`Completable`](crate::Completable).
//! Managers only see tasks through the object-safe [`Schedulable`] trait.

mod action;
mod id;
mod state;
mod stepwise;

pub use action::{Action, ActionTask};
pub use id::TaskId;
pub use state::{Task, TaskOptions, WorkKind};
pub use stepwise::{Body, Sequence, Signal, Step, StepTask, Stepwise};

use crate::completable::Completable;
use crate::error::TaskError;

/// What a manager or worker needs from a task, independent of its kind.
pub trait Schedulable: Completable {
    /// Task identity
    fn id(&self) -> TaskId;

    /// Run one scheduling turn. Returns whether the task is now napping.
    fn step(&self) -> Result<bool, TaskError>;

    /// Whether the task currently refuses to run
    fn is_napping(&self) -> bool;

    /// Whether every unit has run
    fn is_completed(&self) -> bool;

    /// Whether user work failed
    fn is_failed(&self) -> bool;

    /// Whether `abort()` was called
    fn is_aborted(&self) -> bool;

    /// Placement flags fixed at construction
    fn options(&self) -> TaskOptions;

    /// Settle an aborted task that a manager will not place again.
    fn retire(&self);
}
