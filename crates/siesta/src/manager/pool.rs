//! Elastic pool of worker threads
//!
//! The pool grows when the waiting queue gets long or old and shrinks when
//! workers sit bored for too long. Dedicated workers run a single task and
//! join the pool once it is done.

use crate::config::PoolConfig;
use crate::error::{log_sink, ErrorSink, SchedulerError, TaskFailure};
use crate::manager::{NappingSet, TickGuard, WaitQueue};
use crate::stats::{Counters, SchedulerStats};
use crate::task::Schedulable;
use crate::worker::Worker;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Clock readings driving the grow/shrink heuristics
struct Timing {
    /// Last worker birth (spawn or dedicated merge)
    last_spawn: Instant,

    /// Last tick that left no bored worker behind
    last_no_bored: Instant,
}

/// Dynamic thread-pool manager
pub struct PoolManager {
    config: PoolConfig,

    waiting: WaitQueue,
    napping: NappingSet,

    /// General workers, oldest first
    workers: Mutex<Vec<Worker>>,

    /// Workers each running one dedicated task
    dedicated: Mutex<Vec<Worker>>,

    timing: Mutex<Timing>,
    next_worker_id: AtomicUsize,

    /// Failures reported by worker threads, drained on the tick thread
    failures_tx: Sender<TaskFailure>,
    failures_rx: Receiver<TaskFailure>,
    sink: ErrorSink,

    counters: Arc<Counters>,
    ticking: AtomicBool,
    shut_down: AtomicBool,
}

impl PoolManager {
    /// Create a pool that logs task failures.
    pub fn new(config: PoolConfig) -> Result<Self, SchedulerError> {
        Self::with_error_sink(config, log_sink())
    }

    /// Create a pool delivering unhandled task failures to `sink`.
    ///
    /// `min_workers` threads are started right away.
    pub fn with_error_sink(config: PoolConfig, sink: ErrorSink) -> Result<Self, SchedulerError> {
        config.validate()?;
        let (failures_tx, failures_rx) = channel::unbounded();
        let now = Instant::now();

        let pool = Self {
            config,
            waiting: WaitQueue::default(),
            napping: NappingSet::default(),
            workers: Mutex::new(Vec::new()),
            dedicated: Mutex::new(Vec::new()),
            timing: Mutex::new(Timing {
                last_spawn: now,
                last_no_bored: now,
            }),
            next_worker_id: AtomicUsize::new(0),
            failures_tx,
            failures_rx,
            sink,
            counters: Arc::new(Counters::default()),
            ticking: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        };

        {
            let mut workers = pool.workers.lock();
            for _ in 0..pool.config.min_workers {
                pool.spawn_worker(&mut workers)?;
            }
        }

        Ok(pool)
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Queue a task for the next free worker.
    pub fn submit<T: Schedulable + 'static>(&self, task: Arc<T>) -> Arc<T> {
        self.counters.task_submitted();
        self.waiting.push(task.clone());
        task
    }

    /// Start a worker right now that runs only `task`.
    pub fn submit_dedicated<T: Schedulable + 'static>(
        &self,
        task: Arc<T>,
    ) -> Result<Arc<T>, SchedulerError> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::spawn_with(
            id,
            task.clone(),
            self.failures_tx.clone(),
            self.counters.clone(),
        )?;
        self.counters.task_submitted();
        tracing::debug!(worker = id, task = %task.id(), "dedicated worker started");
        self.dedicated.lock().push(worker);
        Ok(task)
    }

    /// One scheduling pass. Callers must not tick from two threads at once.
    pub fn tick(&self) -> Result<(), SchedulerError> {
        let _guard = TickGuard::enter(&self.ticking)?;

        if !self.shut_down.load(Ordering::Acquire) {
            self.napping.requeue_awakened(&self.waiting, &self.counters);
            self.reclaim_dedicated();
            self.assign_work()?;
            if !self.spawn_worker_if_needed()? {
                self.despawn_worker_if_needed();
            }
        }

        self.deliver_failures();
        Ok(())
    }

    /// Merge dedicated workers whose task finished into the general pool.
    fn reclaim_dedicated(&self) {
        let finished: Vec<Worker> = {
            let mut dedicated = self.dedicated.lock();
            let (finished, running): (Vec<Worker>, Vec<Worker>) =
                dedicated.drain(..).partition(|w| !w.is_occupied());
            *dedicated = running;
            finished
        };
        if finished.is_empty() {
            return;
        }

        let mut workers = self.workers.lock();
        let mut timing = self.timing.lock();
        for worker in finished {
            tracing::debug!(worker = worker.id(), "dedicated worker joined the pool");
            workers.push(worker);
            self.counters.worker_spawned();
            timing.last_spawn = Instant::now();
        }
    }

    /// Park napping tasks and hand waiting tasks to bored workers.
    fn assign_work(&self) -> Result<(), SchedulerError> {
        let workers = self.workers.lock();

        let mut bored = Vec::new();
        for worker in workers.iter() {
            if !worker.is_occupied() {
                bored.push(worker);
            } else if let Some(task) = worker.take_back_if_napping() {
                self.napping.insert(task);
                bored.push(worker);
            }
        }

        let mut still_bored = bored.len();
        for worker in bored {
            let Some(task) = self.waiting.pop_ready(&self.counters) else {
                break;
            };
            worker.assign(task)?;
            still_bored -= 1;
        }

        if still_bored == 0 {
            self.timing.lock().last_no_bored = Instant::now();
        }
        Ok(())
    }

    /// Start one more worker if the queue is under pressure and the
    /// cooldown has passed. Returns whether a worker was started.
    pub fn spawn_worker_if_needed(&self) -> Result<bool, SchedulerError> {
        let mut workers = self.workers.lock();
        if workers.len() >= self.config.max_workers {
            return Ok(false);
        }

        let mut timing = self.timing.lock();
        if timing.last_spawn.elapsed() < self.config.spawn_cooldown {
            return Ok(false);
        }

        let (len, oldest) = self.waiting.pressure();
        let Some(oldest) = oldest else {
            return Ok(false);
        };
        if len < self.config.max_queue_length_before_spawn
            && oldest < self.config.max_queue_age_before_spawn
        {
            return Ok(false);
        }

        self.spawn_worker(&mut workers)?;
        timing.last_spawn = Instant::now();
        Ok(true)
    }

    /// Stop one idle worker if the pool has had a bored worker for too long.
    /// Returns whether a worker was stopped.
    pub fn despawn_worker_if_needed(&self) -> bool {
        let mut workers = self.workers.lock();
        if workers.len() <= self.config.min_workers {
            return false;
        }

        let mut timing = self.timing.lock();
        if timing.last_no_bored.elapsed() < self.config.max_idle_before_despawn {
            return false;
        }

        // Newest idle worker first. Occupied workers are never stopped.
        let Some(index) = workers.iter().rposition(|w| !w.is_occupied()) else {
            tracing::error!(
                workers = workers.len(),
                "despawn requested but no idle worker was found"
            );
            return false;
        };

        let mut worker = workers.remove(index);
        worker.stop();
        self.counters.worker_despawned();
        timing.last_no_bored = Instant::now();
        true
    }

    fn spawn_worker(&self, workers: &mut Vec<Worker>) -> Result<(), SchedulerError> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::spawn(id, self.failures_tx.clone(), self.counters.clone())?;
        workers.push(worker);
        self.counters.worker_spawned();
        Ok(())
    }

    fn deliver_failures(&self) {
        while let Ok(failure) = self.failures_rx.try_recv() {
            (self.sink)(failure);
        }
    }

    /// Current number of general workers
    pub fn num_workers(&self) -> usize {
        self.workers.lock().len()
    }

    /// Current number of dedicated workers still running their task
    pub fn num_dedicated_workers(&self) -> usize {
        self.dedicated.lock().len()
    }

    /// Snapshot of counters and queue sizes
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            workers: self.num_workers(),
            dedicated_workers: self.num_dedicated_workers(),
            waiting: self.waiting.len(),
            napping: self.napping.len(),
            ..self.counters.snapshot()
        }
    }

    /// Stop and join every worker. Units already running finish first;
    /// queued and napping tasks are left untouched.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let workers: Vec<Worker> = self.workers.lock().drain(..).collect();
        let dedicated: Vec<Worker> = self.dedicated.lock().drain(..).collect();
        for mut worker in workers.into_iter().chain(dedicated) {
            worker.stop();
        }
        tracing::debug!("pool shut down");
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ActionTask;
    use std::time::Duration;

    fn quiet_pool(config: PoolConfig) -> PoolManager {
        PoolManager::with_error_sink(config, Arc::new(|_: TaskFailure| {})).unwrap()
    }

    #[test]
    fn test_starts_min_workers() {
        let pool = quiet_pool(PoolConfig::fixed(2));
        assert_eq!(pool.num_workers(), 2);
        assert_eq!(pool.stats().workers_spawned, 2);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = PoolConfig {
            min_workers: 4,
            max_workers: 1,
            ..PoolConfig::default()
        };
        assert!(PoolManager::new(config).is_err());
    }

    #[test]
    fn test_no_spawn_without_waiting_work() {
        let pool = quiet_pool(PoolConfig {
            min_workers: 0,
            max_workers: 2,
            spawn_cooldown: Duration::ZERO,
            ..PoolConfig::default()
        });
        assert!(!pool.spawn_worker_if_needed().unwrap());
        assert_eq!(pool.num_workers(), 0);
    }

    #[test]
    fn test_spawn_on_queue_length() {
        let pool = quiet_pool(PoolConfig {
            min_workers: 0,
            max_workers: 2,
            spawn_cooldown: Duration::ZERO,
            max_queue_length_before_spawn: 2,
            max_queue_age_before_spawn: Duration::from_secs(60),
            ..PoolConfig::default()
        });
        pool.submit(ActionTask::new(|_| Ok(())));
        assert!(!pool.spawn_worker_if_needed().unwrap());
        pool.submit(ActionTask::new(|_| Ok(())));
        assert!(pool.spawn_worker_if_needed().unwrap());
        assert_eq!(pool.num_workers(), 1);
    }

    #[test]
    fn test_despawn_respects_min() {
        let pool = quiet_pool(PoolConfig {
            min_workers: 1,
            max_workers: 1,
            max_idle_before_despawn: Duration::ZERO,
            ..PoolConfig::default()
        });
        assert!(!pool.despawn_worker_if_needed());
        assert_eq!(pool.num_workers(), 1);
    }

    #[test]
    fn test_concurrent_tick_rejected() {
        let pool = quiet_pool(PoolConfig::fixed(1));
        let _guard = TickGuard::enter(&pool.ticking).unwrap();
        assert!(matches!(pool.tick(), Err(SchedulerError::ConcurrentTick)));
    }

    #[test]
    fn test_dedicated_merge_restarts_spawn_cooldown() {
        let pool = quiet_pool(PoolConfig {
            min_workers: 0,
            max_workers: 2,
            spawn_cooldown: Duration::from_millis(500),
            max_queue_length_before_spawn: 1,
            ..PoolConfig::default()
        });
        // Let the cooldown from construction run out
        std::thread::sleep(Duration::from_millis(600));

        let dedicated = pool.submit_dedicated(ActionTask::new(|_| Ok(()))).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.num_dedicated_workers() > 0 && Instant::now() < deadline {
            pool.tick().unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(dedicated.is_completed());
        assert_eq!(pool.num_dedicated_workers(), 0);
        assert_eq!(pool.num_workers(), 1);
        assert_eq!(pool.stats().workers_spawned, 1);

        pool.submit(ActionTask::new(|_| Ok(())));
        assert!(!pool.spawn_worker_if_needed().unwrap());
        assert_eq!(pool.num_workers(), 1);
    }

    #[test]
    fn test_shutdown_stops_workers() {
        let pool = quiet_pool(PoolConfig::fixed(3));
        pool.shutdown();
        assert_eq!(pool.num_workers(), 0);
        pool.shutdown();
        assert!(pool.tick().is_ok());
        assert_eq!(pool.num_workers(), 0);
    }
}
