//! ScheduleRegistry: one recurring forecast job per subscription.
//!
//! The registry only says what to run and how often. Dispatch belongs to
//! [`SchedulerEngine`](crate::engine::SchedulerEngine).

use crate::store::ScheduleStore;
use crate::tasks::{Interval, ScheduleEntry, schedule_key};
use chrono::Utc;
use skycast_core::error::Result;
use skycast_core::types::Subscription;
use std::sync::Arc;

/// Lifecycle operations on a subscription's schedule entry.
pub trait ScheduleRegistry: Send + Sync {
    /// Create the entry, starting now. `DuplicateSchedule` if one exists.
    fn register(&self, sub: &Subscription, email: &str, city: &str) -> Result<ScheduleEntry>;

    /// Update the interval of an existing entry.
    ///
    /// Best-effort: a missing entry is logged and reported as `Ok(None)`.
    fn reconfigure(&self, sub: &Subscription) -> Result<Option<ScheduleEntry>>;

    /// Delete the entry. Absent entries are not an error.
    fn unregister(&self, sub: &Subscription) -> Result<bool>;

    fn lookup(&self, sub: &Subscription) -> Result<Option<ScheduleEntry>>;

    /// Every entry, for reconciliation.
    fn entries(&self) -> Result<Vec<ScheduleEntry>>;

    /// Delete by raw key, for entries whose subscription is gone.
    fn remove_key(&self, key: &str) -> Result<bool>;
}

/// Registry writing straight to a [`ScheduleStore`].
pub struct StoreRegistry {
    store: Arc<dyn ScheduleStore>,
}

impl StoreRegistry {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn ScheduleStore> {
        self.store.clone()
    }
}

impl ScheduleRegistry for StoreRegistry {
    fn register(&self, sub: &Subscription, email: &str, city: &str) -> Result<ScheduleEntry> {
        let entry = ScheduleEntry::forecast(sub, email, city, Utc::now());
        self.store.insert(&entry)?;
        tracing::info!(
            "📅 Schedule registered: '{}' {} → {} ({})",
            entry.key, entry.interval, email, city
        );
        Ok(entry)
    }

    fn reconfigure(&self, sub: &Subscription) -> Result<Option<ScheduleEntry>> {
        let key = schedule_key(sub.user_id, sub.id);
        match self.store.set_interval(&key, Interval::minutes(sub.period_minutes))? {
            Some(entry) => {
                tracing::info!("🔁 Schedule reconfigured: '{}' {}", key, entry.interval);
                Ok(Some(entry))
            }
            None => {
                tracing::warn!(
                    "⚠️ No schedule entry '{}' for subscription {}; period change not applied to the schedule",
                    key, sub.id
                );
                Ok(None)
            }
        }
    }

    fn unregister(&self, sub: &Subscription) -> Result<bool> {
        let key = schedule_key(sub.user_id, sub.id);
        let removed = self.store.remove(&key)?;
        if removed {
            tracing::info!("🗑️ Schedule removed: '{}'", key);
        } else {
            tracing::debug!("Schedule '{}' already absent", key);
        }
        Ok(removed)
    }

    fn lookup(&self, sub: &Subscription) -> Result<Option<ScheduleEntry>> {
        self.store.get(&schedule_key(sub.user_id, sub.id))
    }

    fn entries(&self) -> Result<Vec<ScheduleEntry>> {
        self.store.list()
    }

    fn remove_key(&self, key: &str) -> Result<bool> {
        self.store.remove(key)
    }
}
