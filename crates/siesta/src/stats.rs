//! Scheduler statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of scheduler activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total tasks submitted
    pub tasks_submitted: u64,

    /// Total tasks that ran to completion
    pub tasks_completed: u64,

    /// Total tasks that failed
    pub tasks_failed: u64,

    /// Total general workers started (dedicated workers merged into the pool count too)
    pub workers_spawned: u64,

    /// Total general workers stopped by the shrink heuristic
    pub workers_despawned: u64,

    /// Current general worker count
    pub workers: usize,

    /// Current dedicated worker count
    pub dedicated_workers: usize,

    /// Tasks waiting for placement
    pub waiting: usize,

    /// Tasks parked in a napping set
    pub napping: usize,
}

/// Monotonic counters shared between a manager and its workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    spawned: AtomicU64,
    despawned: AtomicU64,
}

impl Counters {
    pub(crate) fn task_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task that finished, either way.
    pub(crate) fn task_finished(&self, failed: bool) {
        if failed {
            self.task_failed();
        } else {
            self.task_completed();
        }
    }

    pub(crate) fn worker_spawned(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_despawned(&self) {
        self.despawned.fetch_add(1, Ordering::Relaxed);
    }

    /// Fill the counter half of a stats snapshot.
    pub(crate) fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_submitted: self.submitted.load(Ordering::Relaxed),
            tasks_completed: self.completed.load(Ordering::Relaxed),
            tasks_failed: self.failed.load(Ordering::Relaxed),
            workers_spawned: self.spawned.load(Ordering::Relaxed),
            workers_despawned: self.despawned.load(Ordering::Relaxed),
            ..SchedulerStats::default()
        }
    }
}

impl SchedulerStats {
    /// Sum of two snapshots, used by the scheduler to merge its managers.
    pub(crate) fn merge(mut self, other: &SchedulerStats) -> SchedulerStats {
        self.tasks_submitted += other.tasks_submitted;
        self.tasks_completed += other.tasks_completed;
        self.tasks_failed += other.tasks_failed;
        self.workers_spawned += other.workers_spawned;
        self.workers_despawned += other.workers_despawned;
        self.workers += other.workers;
        self.dedicated_workers += other.dedicated_workers;
        self.waiting += other.waiting;
        self.napping += other.napping;
        self
    }
}
