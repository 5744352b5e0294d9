//! Scheduler Engine: the loop that finds due entries and dispatches them.
//! Uses tokio::interval for ticking (sleeps between checks). Dispatch only
//! queues work on the [`WorkerPool`]; the tick never waits for a forecast.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use skycast_core::error::Result;
use skycast_core::traits::SubscriptionStore;

use crate::pool::{ForecastJob, PoolSnapshot, WorkerPool};
use crate::store::ScheduleStore;

/// Recurring-job runner over a [`ScheduleStore`].
pub struct SchedulerEngine {
    store: Arc<dyn ScheduleStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    pool: WorkerPool,
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        pool: WorkerPool,
    ) -> Self {
        Self { store, subscriptions, pool }
    }

    /// Tick: dispatch every entry due at `now`.
    /// Returns the keys handed to the pool. A failing entry is logged and
    /// skipped; the rest of the pass still runs.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut dispatched = Vec::new();

        for entry in self.store.list()? {
            if !entry.is_due(now) {
                continue;
            }
            match self.dispatch(&entry.key, now) {
                Ok(Some(key)) => dispatched.push(key),
                Ok(None) => {}
                Err(e) => tracing::error!("⚠️ Dispatch of '{}' failed: {e}", entry.key),
            }
        }

        Ok(dispatched)
    }

    fn dispatch(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        // Re-read under the store's lock: the entry may have been removed or
        // rescheduled since `list`.
        let Some(entry) = self.store.mark_run(key, now)? else {
            tracing::debug!("Schedule '{}' removed or rescheduled before dispatch", key);
            return Ok(None);
        };

        if !self.subscriptions.touch_last_run(entry.target, now)? {
            tracing::warn!(
                "👻 Skipping '{}': subscription {} no longer exists",
                entry.key, entry.target
            );
            return Ok(None);
        }

        tracing::info!("🔔 Schedule triggered: '{}' (run #{})", entry.key, entry.run_count);
        let job = ForecastJob {
            key: entry.key.clone(),
            subscription_id: Some(entry.target),
            recipient: entry.args.email.clone(),
            city: entry.args.city.clone(),
        };
        Ok(self.pool.submit(job).ok().map(|_| entry.key))
    }

    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.store.list()?.len())
    }

    pub fn pool_stats(&self) -> PoolSnapshot {
        self.pool.stats()
    }
}

/// Spawn the scheduler loop as a background tokio task.
pub async fn spawn_scheduler(engine: Arc<SchedulerEngine>, check_interval_secs: u64) {
    tracing::info!(
        "⏰ Scheduler started (check every {}s)",
        check_interval_secs
    );

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(check_interval_secs.max(1)));

    loop {
        interval.tick().await;

        match engine.tick(Utc::now()) {
            Ok(keys) if !keys.is_empty() => {
                tracing::debug!("📣 Dispatched {} job(s)", keys.len());
            }
            Ok(_) => {}
            Err(e) => tracing::error!("⚠️ Scheduler tick failed: {e}"),
        }
    }
}
