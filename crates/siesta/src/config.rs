//! Scheduler configuration
//!
//! Values are immutable once a manager is built. Durations are written as
//! integer milliseconds when (de)serialized.

use crate::error::SchedulerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sizing thresholds for the elastic worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers kept alive even when idle
    pub min_workers: usize,

    /// Upper bound on general workers (dedicated workers are not counted)
    pub max_workers: usize,

    /// Minimum time between two worker spawns
    #[serde(rename = "spawn_cooldown_ms", with = "duration_ms")]
    pub spawn_cooldown: Duration,

    /// Waiting-queue length that triggers a spawn
    pub max_queue_length_before_spawn: usize,

    /// Age of the oldest waiting task that triggers a spawn
    #[serde(rename = "max_queue_age_before_spawn_ms", with = "duration_ms")]
    pub max_queue_age_before_spawn: Duration,

    /// How long the pool may keep a bored worker before despawning one
    #[serde(rename = "max_idle_before_despawn_ms", with = "duration_ms")]
    pub max_idle_before_despawn: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            min_workers: cpus.saturating_sub(1),
            max_workers: cpus * 8,
            spawn_cooldown: Duration::from_millis(500),
            max_queue_length_before_spawn: 4,
            max_queue_age_before_spawn: Duration::from_millis(1000),
            max_idle_before_despawn: Duration::from_millis(10_000),
        }
    }
}

impl PoolConfig {
    /// Pool with a fixed worker count that never grows or shrinks.
    pub fn fixed(workers: usize) -> Self {
        Self {
            min_workers: workers,
            max_workers: workers,
            ..Self::default()
        }
    }

    /// Check that the bounds are consistent.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_workers == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.min_workers > self.max_workers {
            return Err(SchedulerError::InvalidConfig(format!(
                "min_workers ({}) exceeds max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }
        Ok(())
    }
}

/// Budget for the executor that runs on the tick caller's thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Tasks finished per tick at most (None = drain the queue every tick).
    /// A negative value in a config file also means unbounded.
    #[serde(deserialize_with = "tick_budget::deserialize")]
    pub max_tasks_per_tick: Option<usize>,
}

impl LocalConfig {
    /// Executor finishing at most `budget` tasks per tick.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            max_tasks_per_tick: Some(budget),
        }
    }
}

/// Configuration for a whole [`Scheduler`](crate::Scheduler)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Elastic pool settings
    pub pool: PoolConfig,

    /// Caller-thread executor settings
    pub local: LocalConfig,
}

/// Serde adapter storing a `Duration` as whole milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    /// Deserialize from milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Reads a per-tick budget where any negative number means unbounded
mod tick_budget {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<usize>, D::Error> {
        let value = i64::deserialize(deserializer)?;
        if value < 0 {
            return Ok(None);
        }
        usize::try_from(value)
            .map(Some)
            .map_err(|_| D::Error::custom(format!("tick budget {} is too large", value)))
    }
}
