//! Cache Warming
//!
//! Warming tasks select keys from a [`WarmingSource`] by pattern and load
//! them through the manager. Scheduled tasks run when `next_run_at` is due.
//!
//! # Schedules
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `@every 30s`, `@every 5m`, `@every 2h` | fixed interval from the last run |
//! | `@hourly` | top of every hour (UTC) |
//! | `@daily` | midnight UTC |
//! | `*/N * * * *` | every minute divisible by N |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, Timelike, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backends::glob_match;
use crate::cache::MultiLevelCacheManager;
use crate::domain::models::CacheWarmingTask;
use crate::domain::ports::WarmingTaskRepository;
use crate::error::{Error, Result};
use crate::settings::parse_duration;

/// Parsed warming schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    Hourly,
    Daily,
    EveryMinutes(u32),
}

impl FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::ScheduleParse {
            schedule: s.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = s.trim();

        match trimmed {
            "@hourly" => return Ok(Schedule::Hourly),
            "@daily" | "@midnight" => return Ok(Schedule::Daily),
            _ => {}
        }

        if let Some(interval) = trimmed.strip_prefix("@every") {
            let interval = parse_duration(interval).map_err(|e| invalid(&e.to_string()))?;
            return Ok(Schedule::Every(interval));
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid("expected @every, @hourly, @daily or 5 cron fields"));
        }
        if fields[1..].iter().any(|f| *f != "*") {
            return Err(invalid("only the minute field may be restricted"));
        }
        let step = match fields[0] {
            "*" => 1,
            minute => minute
                .strip_prefix("*/")
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| invalid("minute field must be * or */N"))?,
        };
        if !(1..=59).contains(&step) {
            return Err(invalid("minute step must be between 1 and 59"));
        }
        Ok(Schedule::EveryMinutes(step))
    }
}

impl Schedule {
    /// First run strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Every(interval) => {
                after
                    + chrono::Duration::from_std(interval)
                        .unwrap_or_else(|_| chrono::Duration::days(1))
            }
            Schedule::Hourly => truncate(after, chrono::Duration::hours(1)) + chrono::Duration::hours(1),
            Schedule::Daily => truncate(after, chrono::Duration::days(1)) + chrono::Duration::days(1),
            Schedule::EveryMinutes(step) => {
                let mut next = truncate(after, chrono::Duration::minutes(1)) + chrono::Duration::minutes(1);
                while next.minute() % step != 0 {
                    next += chrono::Duration::minutes(1);
                }
                next
            }
        }
    }
}

fn truncate(at: DateTime<Utc>, unit: chrono::Duration) -> DateTime<Utc> {
    at.duration_trunc(unit).unwrap_or(at)
}

/// Supplies keys and values for warming
#[async_trait]
pub trait WarmingSource: Send + Sync {
    /// Keys of a cache matching a glob pattern
    async fn keys(&self, cache_name: &str, pattern: &str) -> Result<Vec<String>>;

    /// Value for a key; `None` skips the key
    async fn load(&self, cache_name: &str, key: &str) -> Result<Option<Value>>;
}

/// Warming source backed by an in-process map
#[derive(Debug, Default)]
pub struct StaticWarmingSource {
    values: DashMap<(String, String), Value>,
}

impl StaticWarmingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cache_name: &str, key: &str, value: Value) {
        self.values
            .insert((cache_name.to_string(), key.to_string()), value);
    }
}

#[async_trait]
impl WarmingSource for StaticWarmingSource {
    async fn keys(&self, cache_name: &str, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .values
            .iter()
            .filter(|e| e.key().0 == cache_name && glob_match(pattern, &e.key().1))
            .map(|e| e.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn load(&self, cache_name: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .values
            .get(&(cache_name.to_string(), key.to_string()))
            .map(|v| v.value().clone()))
    }
}

/// Outcome of one task execution
#[derive(Debug, Clone, Serialize)]
pub struct WarmingRun {
    pub task_id: Uuid,
    pub cache_name: String,
    pub requested: usize,
    pub warmed: usize,
    pub failed: usize,
    pub success: bool,
}

/// Creates, executes and schedules warming tasks
pub struct WarmingScheduler {
    manager: Arc<MultiLevelCacheManager>,
    tasks: Arc<dyn WarmingTaskRepository>,
    source: Arc<dyn WarmingSource>,
}

impl WarmingScheduler {
    pub fn new(
        manager: Arc<MultiLevelCacheManager>,
        tasks: Arc<dyn WarmingTaskRepository>,
        source: Arc<dyn WarmingSource>,
    ) -> Self {
        Self {
            manager,
            tasks,
            source,
        }
    }

    /// Validate the schedule and store a task with its first run time
    pub async fn create_task(&self, mut task: CacheWarmingTask) -> Result<CacheWarmingTask> {
        if let Some(schedule) = &task.schedule {
            let schedule: Schedule = schedule.parse()?;
            task.next_run_at = Some(schedule.next_after(Utc::now()));
        }
        self.tasks.insert(task.clone()).await?;
        info!(task = %task.name, cache = %task.cache_name, schedule = ?task.schedule, "Warming task created");
        Ok(task)
    }

    pub async fn list_tasks(&self, cache_name: Option<&str>) -> Result<Vec<CacheWarmingTask>> {
        self.tasks.list(cache_name).await
    }

    /// Run a task now
    pub async fn execute(&self, id: Uuid) -> Result<WarmingRun> {
        let task = self
            .tasks
            .get(id)
            .await?
            .ok_or_else(|| Error::WarmingTaskNotFound(id.to_string()))?;
        self.run(task).await
    }

    async fn run(&self, mut task: CacheWarmingTask) -> Result<WarmingRun> {
        let now = Utc::now();
        let run = match self
            .source
            .keys(&task.cache_name, &task.query_pattern)
            .await
        {
            Ok(keys) => {
                let source = self.source.clone();
                let cache_name = task.cache_name.clone();
                let results = self
                    .manager
                    .warm(&task.cache_name, &keys, |key| {
                        let source = source.clone();
                        let cache_name = cache_name.clone();
                        async move { source.load(&cache_name, &key).await }
                    })
                    .await;
                let warmed = results.values().filter(|ok| **ok).count();
                WarmingRun {
                    task_id: task.id,
                    cache_name: task.cache_name.clone(),
                    requested: keys.len(),
                    warmed,
                    failed: keys.len() - warmed,
                    success: warmed == keys.len(),
                }
            }
            Err(e) => {
                warn!(task = %task.name, cache = %task.cache_name, error = %e, "Warming source failed");
                WarmingRun {
                    task_id: task.id,
                    cache_name: task.cache_name.clone(),
                    requested: 0,
                    warmed: 0,
                    failed: 0,
                    success: false,
                }
            }
        };

        if run.success {
            task.success_count += 1;
        } else {
            task.failure_count += 1;
        }
        task.last_run_at = Some(now);
        task.next_run_at = match &task.schedule {
            Some(schedule) => Some(schedule.parse::<Schedule>()?.next_after(now)),
            None => None,
        };
        self.tasks.update(task.clone()).await?;

        info!(
            task = %task.name,
            cache = %task.cache_name,
            warmed = run.warmed,
            failed = run.failed,
            "Warming task executed"
        );
        Ok(run)
    }

    /// Execute every active scheduled task whose next run is due
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<WarmingRun>> {
        let mut runs = Vec::new();
        for task in self.tasks.list(None).await? {
            let due = task.is_active
                && task.schedule.is_some()
                && task.next_run_at.is_some_and(|at| at <= now);
            if !due {
                continue;
            }
            match self.run(task).await {
                Ok(run) => runs.push(run),
                Err(e) => warn!(error = %e, "Scheduled warming failed"),
            }
        }
        Ok(runs)
    }

    /// Poll for due tasks every `tick` until cancelled
    pub fn spawn(self: Arc<Self>, tick: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.run_due(Utc::now()).await {
                            Ok(runs) if !runs.is_empty() => debug!(runs = runs.len(), "Scheduled warming pass"),
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Warming scheduler pass failed"),
                        }
                    }
                }
            }
            info!("Warming scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "@every 30s".parse::<Schedule>().unwrap(),
            Schedule::Every(Duration::from_secs(30))
        );
        assert_eq!(
            "@every 5m".parse::<Schedule>().unwrap(),
            Schedule::Every(Duration::from_secs(300))
        );
        assert_eq!("@hourly".parse::<Schedule>().unwrap(), Schedule::Hourly);
        assert_eq!("@daily".parse::<Schedule>().unwrap(), Schedule::Daily);
        assert_eq!(
            "*/15 * * * *".parse::<Schedule>().unwrap(),
            Schedule::EveryMinutes(15)
        );
        assert_eq!("* * * * *".parse::<Schedule>().unwrap(), Schedule::EveryMinutes(1));
    }

    #[test]
    fn test_parse_rejects() {
        for bad in ["", "@weekly", "@every", "*/0 * * * *", "*/15 3 * * *", "5 * * * *", "* * *"] {
            assert!(bad.parse::<Schedule>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_next_after() {
        assert_eq!(
            Schedule::Every(Duration::from_secs(90)).next_after(at(10, 0, 0)),
            at(10, 1, 30)
        );
        assert_eq!(Schedule::Hourly.next_after(at(10, 20, 5)), at(11, 0, 0));
        assert_eq!(Schedule::Hourly.next_after(at(10, 0, 0)), at(11, 0, 0));
        assert_eq!(
            Schedule::Daily.next_after(at(10, 20, 5)),
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(Schedule::EveryMinutes(15).next_after(at(10, 7, 0)), at(10, 15, 0));
        assert_eq!(Schedule::EveryMinutes(15).next_after(at(10, 15, 0)), at(10, 30, 0));
        assert_eq!(Schedule::EveryMinutes(15).next_after(at(10, 50, 0)), at(11, 0, 0));
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticWarmingSource::new();
        source.insert("catalog", "product:1", Value::from(1));
        source.insert("catalog", "product:2", Value::from(2));
        source.insert("catalog", "category:1", Value::from(3));
        source.insert("other", "product:9", Value::from(9));

        let keys = source.keys("catalog", "product:*").await.unwrap();
        assert_eq!(keys, vec!["product:1", "product:2"]);
        assert_eq!(
            source.load("catalog", "product:2").await.unwrap(),
            Some(Value::from(2))
        );
        assert_eq!(source.load("catalog", "nope").await.unwrap(), None);
    }
}
