//! Bounded worker pool for forecast jobs.
//!
//! The scheduler tick submits without waiting: jobs go into a bounded queue
//! and a dispatcher hands them to at most `max_concurrent` workers. A slow
//! weather API therefore never stalls dispatch of other entries. A full queue
//! drops the job instead of blocking the caller.

use crate::pipeline::ForecastPipeline;
use crate::tasks::RetryPolicy;
use serde::Serialize;
use skycast_core::error::{Result, SkycastError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Semaphore, mpsc};

/// One unit of work: run the pipeline once for a recipient.
#[derive(Debug, Clone)]
pub struct ForecastJob {
    /// Schedule key, or a label for ad-hoc runs.
    pub key: String,
    pub subscription_id: Option<i64>,
    pub recipient: String,
    pub city: String,
}

#[derive(Default)]
struct PoolStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
    pub retried: u64,
}

impl PoolSnapshot {
    /// Jobs accepted but not yet finished.
    pub fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.succeeded + self.failed)
    }
}

/// Handle to the pool. Cheap to clone.
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<ForecastJob>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Spawn the dispatcher. Must be called inside a tokio runtime.
    pub fn start(
        pipeline: Arc<ForecastPipeline>,
        max_concurrent: usize,
        queue_capacity: usize,
        retry: RetryPolicy,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<ForecastJob>(queue_capacity.max(1));
        let stats = Arc::new(PoolStats::default());
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let worker_stats = stats.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let pipeline = pipeline.clone();
                let stats = worker_stats.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    run_job(&pipeline, &job, retry, &stats).await;
                });
            }
            tracing::debug!("Worker pool dispatcher stopped");
        });

        tracing::info!(
            "👷 Worker pool started ({} workers, queue {})",
            max_concurrent.max(1),
            queue_capacity.max(1)
        );
        Self { tx, stats }
    }

    /// Queue a job without waiting. `QueueFull` when there is no room.
    pub fn submit(&self, job: ForecastJob) -> Result<()> {
        match self.tx.try_send(job) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(job)) | Err(mpsc::error::TrySendError::Closed(job)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("🚫 Job '{}' dropped: queue full", job.key);
                Err(SkycastError::QueueFull)
            }
        }
    }

    pub fn stats(&self) -> PoolSnapshot {
        PoolSnapshot {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            retried: self.stats.retried.load(Ordering::Relaxed),
        }
    }
}

/// Run a job to completion, retrying retryable failures.
/// Failures end here: they are logged and counted, never propagated.
async fn run_job(pipeline: &ForecastPipeline, job: &ForecastJob, retry: RetryPolicy, stats: &PoolStats) {
    let mut attempt = 0u32;
    loop {
        match pipeline.run(&job.recipient, &job.city).await {
            Ok(_) => {
                stats.succeeded.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                attempt += 1;
                stats.retried.fetch_add(1, Ordering::Relaxed);
                let delay = retry.delay_for(attempt);
                tracing::warn!(
                    "🔄 Job '{}' retry {}/{} in {:?}: {}",
                    job.key, attempt, retry.max_retries, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    "💥 Job '{}' failed after {} attempt(s): {}",
                    job.key,
                    attempt + 1,
                    e
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skycast_channels::LogNotifier;
    use skycast_db::Database;
    use skycast_providers::{StaticWeatherApi, WeatherProvider};
    use std::time::Duration;

    fn pipeline() -> (Arc<StaticWeatherApi>, Arc<LogNotifier>, Arc<ForecastPipeline>) {
        let api = Arc::new(StaticWeatherApi::new());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let provider = Arc::new(WeatherProvider::new(api.clone(), db.clone(), db));
        let notifier = Arc::new(LogNotifier::new());
        let pipeline = Arc::new(ForecastPipeline::new(provider, notifier.clone()));
        (api, notifier, pipeline)
    }

    fn job(city: &str) -> ForecastJob {
        ForecastJob {
            key: format!("test:{city}"),
            subscription_id: None,
            recipient: "olena@example.com".into(),
            city: city.into(),
        }
    }

    async fn wait_finished(pool: &WorkerPool, expected: u64) -> PoolSnapshot {
        for _ in 0..500 {
            let stats = pool.stats();
            if stats.succeeded + stats.failed >= expected {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("jobs did not finish: {:?}", pool.stats());
    }

    #[tokio::test]
    async fn test_jobs_run_concurrently_to_completion() {
        let (_api, notifier, pipeline) = pipeline();
        let pool = WorkerPool::start(pipeline, 2, 16, RetryPolicy::none());

        for city in ["Kyiv", "London", "Lisbon"] {
            pool.submit(job(city)).unwrap();
        }
        let stats = wait_finished(&pool, 3).await;
        assert_eq!(stats.succeeded, 3);
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(notifier.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried() {
        let (api, _notifier, pipeline) = pipeline();
        api.set_available(false);
        let pool = WorkerPool::start(pipeline, 1, 4, RetryPolicy::new(2, Duration::from_millis(1)));

        pool.submit(job("Kyiv")).unwrap();
        let stats = wait_finished(&pool, 1).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 2);
        assert_eq!(api.geocode_calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_reported_once() {
        let (api, _notifier, pipeline) = pipeline();
        let pool = WorkerPool::start(pipeline, 1, 4, RetryPolicy::new(3, Duration::from_millis(1)));

        pool.submit(job("Atlantis")).unwrap();
        let stats = wait_finished(&pool, 1).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 0);
        assert_eq!(api.geocode_calls(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_job() {
        let (tx, _rx) = mpsc::channel(1);
        let pool = WorkerPool { tx, stats: Arc::new(PoolStats::default()) };

        pool.submit(job("Kyiv")).unwrap();
        let err = pool.submit(job("London")).unwrap_err();
        assert!(matches!(err, SkycastError::QueueFull));

        let stats = pool.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.dropped, 1);
    }
}
