//! `siesta run`: drive a synthetic workload until every task has finished.

use super::config;
use siesta::{Scheduler, SchedulerStats, Sequence, Signal, TaskFailure};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Shape of the generated tasks
#[derive(Debug, Clone)]
pub struct Workload {
    pub tasks: usize,
    pub local_tasks: usize,
    pub failing: usize,
    pub work: Duration,
    pub nap: Duration,
}

/// Tick loop timing
#[derive(Debug, Clone)]
pub struct Pacing {
    pub tick: Duration,
    pub timeout: Duration,
}

fn busy(duration: Duration) {
    let until = Instant::now() + duration;
    while Instant::now() < until {
        std::hint::spin_loop();
    }
}

/// Two busy stages separated by a nap, so workers are freed in between.
fn pool_body(index: usize, workload: &Workload) -> Sequence {
    let work = workload.work;
    let nap = workload.nap;
    let fails = index < workload.failing;
    Sequence::new()
        .then(move |_| {
            busy(work);
            Ok(Some(Signal::nap_for(nap)))
        })
        .then(move |task| {
            if fails {
                anyhow::bail!("synthetic failure in task {}", task.id());
            }
            busy(work);
            Ok(None)
        })
}

pub fn execute(
    config_path: Option<&Path>,
    workload: &Workload,
    pacing: &Pacing,
) -> anyhow::Result<()> {
    let config = config::load(config_path)?;
    tracing::info!(
        min_workers = config.pool.min_workers,
        max_workers = config.pool.max_workers,
        "starting scheduler"
    );

    let failures = Arc::new(AtomicUsize::new(0));
    let sink_failures = failures.clone();
    let scheduler = Scheduler::with_error_sink(
        config,
        Arc::new(move |failure: TaskFailure| {
            sink_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(task = %failure.task, "task failed: {:#}", failure.error);
        }),
    )?;

    let started = Instant::now();
    for index in 0..workload.tasks {
        scheduler.spawn_steps(pool_body(index, workload));
    }
    for _ in 0..workload.local_tasks {
        scheduler.spawn_local(|_| Ok(()));
    }

    // Counters move after a task's final step returns, so they trail the
    // task flags; waiting on them means every failure is already queued.
    let finished = |stats: &SchedulerStats| {
        stats.tasks_completed + stats.tasks_failed == stats.tasks_submitted
    };

    let mut ticks = 0u64;
    let mut peak_workers = scheduler.stats().workers;
    loop {
        scheduler.tick()?;
        ticks += 1;
        let stats = scheduler.stats();
        peak_workers = peak_workers.max(stats.workers);
        if finished(&stats) {
            break;
        }
        if started.elapsed() > pacing.timeout {
            scheduler.shutdown();
            anyhow::bail!(
                "workload did not finish within {:?} ({} ticks)",
                pacing.timeout,
                ticks
            );
        }
        thread::sleep(pacing.tick);
    }
    let elapsed = started.elapsed();

    // Failures sent during the last tick are delivered by the next one.
    scheduler.tick()?;
    let stats = scheduler.stats();
    report(&stats, ticks, peak_workers, elapsed, failures.load(Ordering::Relaxed));

    scheduler.shutdown();
    Ok(())
}

fn report(
    stats: &SchedulerStats,
    ticks: u64,
    peak_workers: usize,
    elapsed: Duration,
    sink_failures: usize,
) {
    println!("Finished in {:.2?} over {} ticks", elapsed, ticks);
    println!("  tasks submitted:   {}", stats.tasks_submitted);
    println!("  tasks completed:   {}", stats.tasks_completed);
    println!("  tasks failed:      {}", stats.tasks_failed);
    println!("  failures reported: {}", sink_failures);
    println!("  workers spawned:   {}", stats.workers_spawned);
    println!("  workers despawned: {}", stats.workers_despawned);
    println!("  peak workers:      {}", peak_workers);
    println!("  final workers:     {}", stats.workers);
}

#[cfg(test)]
mod tests {
    use super::*;
    use siesta::StepTask;

    #[test]
    fn test_pool_body_naps_between_stages() {
        let workload = Workload {
            tasks: 1,
            local_tasks: 0,
            failing: 0,
            work: Duration::ZERO,
            nap: Duration::from_millis(5),
        };
        let task = StepTask::new(pool_body(0, &workload));

        assert!(task.step().unwrap());
        assert!(task.is_napping());

        thread::sleep(Duration::from_millis(10));
        assert!(!task.is_napping());
        assert!(!task.step().unwrap());
        assert!(task.is_completed());
    }

    #[test]
    fn test_failing_body_reports_error() {
        let workload = Workload {
            tasks: 1,
            local_tasks: 0,
            failing: 1,
            work: Duration::ZERO,
            nap: Duration::ZERO,
        };
        let task = StepTask::new(pool_body(0, &workload));

        let mut result = task.step();
        while let Ok(true) = result {
            result = task.step();
        }
        let err = result.unwrap_err();
        assert!(err.to_string().contains("synthetic failure"));
        assert!(task.is_failed());
    }
}
