//! Error types for tasks and managers.

use crate::task::TaskId;
use std::sync::Arc;

/// Errors captured while stepping a Task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// User-supplied work returned an error
    #[error(transparent)]
    Execution(#[from] anyhow::Error),

    /// User-supplied work panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// A resumable body asked its own task to wait on itself
    #[error("a task cannot wait on itself to finish")]
    WaitOnSelf,

    /// `step()` was entered while another thread was already stepping the
    /// same task. This is a placement bug, not a failure of the task.
    #[error("task {0} is already being stepped")]
    AlreadyRunning(TaskId),
}

impl TaskError {
    /// Build a `Panicked` error from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked(message)
    }
}

/// Why an `extend` call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtendError {
    /// The task already ran every unit it had
    #[error("cannot extend a completed task")]
    Completed,

    /// The task failed and will not run again
    #[error("cannot extend a failed task")]
    Failed,

    /// The task was aborted
    #[error("cannot extend an aborted task")]
    Aborted,
}

/// Errors raised by managers and workers.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A task was handed to a worker that already holds one
    #[error("worker {0} already holds a task")]
    WorkerOccupied(usize),

    /// The OS refused to start a worker thread
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// Configuration values are inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `tick()` was entered while another tick was still running
    #[error("tick() called concurrently; ticks must be serialized by the caller")]
    ConcurrentTick,
}

/// A task error that had no per-task handler and is delivered to the host.
#[derive(Debug)]
pub struct TaskFailure {
    /// The failed task
    pub task: TaskId,
    /// What went wrong
    pub error: TaskError,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task {} failed: {}", self.task, self.error)
    }
}

/// Host callback receiving failures, invoked on the tick caller's thread.
pub type ErrorSink = Arc<dyn Fn(TaskFailure) + Send + Sync>;

/// Sink used when the host does not install one.
pub(crate) fn log_sink() -> ErrorSink {
    Arc::new(|failure: TaskFailure| {
        tracing::error!(task = %failure.task, "{}", failure);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payload_str() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        match TaskError::from_panic(payload) {
            TaskError::Panicked(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_panic_payload_string() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("kaboom"));
        match TaskError::from_panic(payload) {
            TaskError::Panicked(msg) => assert_eq!(msg, "kaboom"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_execution_error_is_transparent() {
        let err = TaskError::from(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_failure_display() {
        let failure = TaskFailure {
            task: TaskId::from_u64(7),
            error: TaskError::WaitOnSelf,
        };
        assert_eq!(
            failure.to_string(),
            "task 7 failed: a task cannot wait on itself to finish"
        );
    }
}
