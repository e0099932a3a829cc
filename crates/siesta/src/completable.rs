//! Completion signals a napping task can wait on.
//!
//! A resumable body suspends on anything implementing [`Completable`]: another
//! task, a [`Deadline`], a [`Latch`] released by the host, or a user type.

use crate::task::TaskId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Something that becomes satisfied at some point.
///
/// `is_satisfied` is queried from worker threads and from the tick caller,
/// so implementations must be thread-safe and cheap.
pub trait Completable: Send + Sync {
    /// Returns true once this signal is satisfied.
    fn is_satisfied(&self) -> bool;

    /// The task behind this signal, if it is one. Used to reject a task
    /// waiting on itself.
    fn task_id(&self) -> Option<TaskId> {
        None
    }
}

/// Satisfied once a fixed point in time has been reached.
///
/// A deadline too far out for the clock to represent is never reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    wake_at: Option<Instant>,
}

impl Deadline {
    /// Deadline `duration` from now.
    pub fn after(duration: Duration) -> Self {
        Self {
            wake_at: Instant::now().checked_add(duration),
        }
    }

    /// Deadline at an absolute instant.
    pub fn at(wake_at: Instant) -> Self {
        Self {
            wake_at: Some(wake_at),
        }
    }

    /// A deadline that is never reached.
    pub fn never() -> Self {
        Self { wake_at: None }
    }

    /// When this deadline is reached, `None` if never.
    pub fn wake_at(&self) -> Option<Instant> {
        self.wake_at
    }

    /// Time left before the deadline, zero once passed.
    pub fn remaining(&self) -> Duration {
        match self.wake_at {
            Some(wake_at) => wake_at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }
}

impl Completable for Deadline {
    fn is_satisfied(&self) -> bool {
        self.wake_at.is_some_and(|wake_at| Instant::now() >= wake_at)
    }
}

/// A one-shot flag released by whoever holds it.
#[derive(Debug, Default)]
pub struct Latch {
    released: AtomicBool,
}

impl Latch {
    /// New, unreleased latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the latch. Idempotent.
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// Whether `release` has been called.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Completable for Latch {
    fn is_satisfied(&self) -> bool {
        self.is_released()
    }
}
