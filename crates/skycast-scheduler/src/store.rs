//! Schedule store: where recurring entries live.
//!
//! `SchedulerDb` (SQLite) is the durable implementation; `MemoryScheduleStore`
//! serves tests and throwaway runs. Reads and writes only happen on
//! subscription changes and dispatch, not on every tick.

use crate::tasks::{Interval, ScheduleEntry};
use chrono::{DateTime, Utc};
use skycast_core::error::{Result, SkycastError};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Keyed storage for schedule entries.
pub trait ScheduleStore: Send + Sync {
    /// Insert a new entry. Fails with `DuplicateSchedule` if the key exists.
    fn insert(&self, entry: &ScheduleEntry) -> Result<()>;

    /// Record a dispatch at `now` if the entry is still due.
    ///
    /// Touches only `last_run`, `next_run` and `run_count`; `next_run` is
    /// computed from the interval as stored at the time of the write.
    /// `None` when the entry is gone or no longer due.
    fn mark_run(&self, key: &str, now: DateTime<Utc>) -> Result<Option<ScheduleEntry>>;

    /// Replace the interval and recompute `next_run`, leaving run bookkeeping
    /// alone. `None` when the entry is gone.
    fn set_interval(&self, key: &str, interval: Interval) -> Result<Option<ScheduleEntry>>;

    /// Delete by key. Returns whether an entry was removed.
    fn remove(&self, key: &str) -> Result<bool>;

    fn get(&self, key: &str) -> Result<Option<ScheduleEntry>>;

    fn list(&self) -> Result<Vec<ScheduleEntry>>;
}

/// In-process schedule store.
#[derive(Default)]
pub struct MemoryScheduleStore {
    entries: Mutex<BTreeMap<String, ScheduleEntry>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, BTreeMap<String, ScheduleEntry>>> {
        self.entries
            .lock()
            .map_err(|e| SkycastError::Database(format!("Lock: {e}")))
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn insert(&self, entry: &ScheduleEntry) -> Result<()> {
        let mut entries = self.entries()?;
        if entries.contains_key(&entry.key) {
            return Err(SkycastError::DuplicateSchedule(entry.key.clone()));
        }
        entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn mark_run(&self, key: &str, now: DateTime<Utc>) -> Result<Option<ScheduleEntry>> {
        let mut entries = self.entries()?;
        match entries.get_mut(key) {
            Some(entry) if entry.is_due(now) => {
                entry.advance(now);
                Ok(Some(entry.clone()))
            }
            _ => Ok(None),
        }
    }

    fn set_interval(&self, key: &str, interval: Interval) -> Result<Option<ScheduleEntry>> {
        let mut entries = self.entries()?;
        Ok(entries.get_mut(key).map(|entry| {
            entry.set_interval(interval);
            entry.clone()
        }))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries()?.remove(key).is_some())
    }

    fn get(&self, key: &str) -> Result<Option<ScheduleEntry>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn list(&self) -> Result<Vec<ScheduleEntry>> {
        Ok(self.entries()?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use skycast_core::types::Subscription;

    fn entry(id: i64) -> ScheduleEntry {
        let sub = Subscription {
            id,
            user_id: 1,
            city_id: 1,
            period_minutes: 1,
            last_run_at: None,
            created_at: Utc::now(),
        };
        ScheduleEntry::forecast(&sub, "a@example.com", "Kyiv", Utc::now())
    }

    #[test]
    fn test_insert_twice_is_duplicate() {
        let store = MemoryScheduleStore::new();
        store.insert(&entry(1)).unwrap();
        assert!(matches!(
            store.insert(&entry(1)),
            Err(SkycastError::DuplicateSchedule(_))
        ));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_key_is_none() {
        let store = MemoryScheduleStore::new();
        let e = entry(2);
        assert!(store.mark_run(&e.key, Utc::now() + Duration::hours(1)).unwrap().is_none());
        assert!(store.set_interval(&e.key, Interval::minutes(5)).unwrap().is_none());
    }

    #[test]
    fn test_mark_run_keeps_stored_interval() {
        let store = MemoryScheduleStore::new();
        let e = entry(4);
        store.insert(&e).unwrap();
        store.set_interval(&e.key, Interval::minutes(60)).unwrap().unwrap();

        // Not due under the new interval.
        let now = e.start_time + Duration::minutes(2);
        assert!(store.mark_run(&e.key, now).unwrap().is_none());

        let now = e.start_time + Duration::hours(2);
        let marked = store.mark_run(&e.key, now).unwrap().unwrap();
        assert_eq!(marked.interval, Interval::minutes(60));
        assert_eq!(marked.run_count, 1);
        assert_eq!(marked.last_run, Some(now));
        assert_eq!(marked.next_run, now + Duration::minutes(60));
        assert_eq!(store.get(&e.key).unwrap().unwrap(), marked);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = MemoryScheduleStore::new();
        let e = entry(3);
        store.insert(&e).unwrap();
        assert!(store.remove(&e.key).unwrap());
        assert!(!store.remove(&e.key).unwrap());
        assert!(store.get(&e.key).unwrap().is_none());
    }
}
