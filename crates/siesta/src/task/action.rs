//! Callback tasks
//!
//! Each unit is a one-shot closure receiving the task handle. A closure can
//! queue more work on its own task, abort it, or nap it, and the rest of the
//! queue is drained in the same `step()` unless it does.

use crate::error::{ExtendError, TaskError};
use crate::task::{Task, TaskOptions, WorkKind};
use std::sync::Arc;

/// Work kind for [`ActionTask`]
#[derive(Debug)]
pub enum Action {}

/// A task whose units are callbacks
pub type ActionTask = Task<Action>;

type Callback = Box<dyn FnOnce(&ActionTask) -> anyhow::Result<()> + Send>;

impl WorkKind for Action {
    type Unit = Callback;

    fn drive(task: &ActionTask) -> Result<(), TaskError> {
        while !task.is_napping() {
            let Some(callback) = task.take_unit() else {
                break;
            };
            callback(task)?;
        }
        Ok(())
    }
}

impl Task<Action> {
    /// Create a callback task with default options.
    pub fn new<F>(f: F) -> Arc<Self>
    where
        F: FnOnce(&ActionTask) -> anyhow::Result<()> + Send + 'static,
    {
        Self::with_options(f, TaskOptions::default())
    }

    /// Create a callback task with explicit placement flags.
    pub fn with_options<F>(f: F, options: TaskOptions) -> Arc<Self>
    where
        F: FnOnce(&ActionTask) -> anyhow::Result<()> + Send + 'static,
    {
        Self::with_unit(Box::new(f), options)
    }

    /// Queue `f` to run after every unit already queued.
    ///
    /// Fails once the task is completed, failed or aborted.
    pub fn extend<F>(&self, f: F) -> Result<(), ExtendError>
    where
        F: FnOnce(&ActionTask) -> anyhow::Result<()> + Send + 'static,
    {
        self.push_extension(Box::new(f))
    }
}
