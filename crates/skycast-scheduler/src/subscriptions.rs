//! SubscriptionService: subscription CRUD kept in step with the schedule.
//!
//! The relational store and the schedule store are separate systems, so
//! consistency comes from call order rather than a shared transaction:
//! create writes the row then registers, delete unregisters then removes the
//! row. A subscription that exists without a schedule entry is the one
//! tolerated inconsistency; [`SubscriptionService::reconcile`] finds it.

use crate::registry::ScheduleRegistry;
use crate::tasks::ScheduleEntry;
use serde::Serialize;
use skycast_core::error::{Result, SkycastError};
use skycast_core::traits::{CityStore, SubscriptionStore, UserStore};
use skycast_core::types::{Subscription, User};
use skycast_providers::WeatherProvider;
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Subscriptions found without a schedule entry.
    pub unscheduled: Vec<i64>,
    /// Of those, the ones registered again.
    pub rescheduled: Vec<i64>,
    /// Keys of entries whose subscription no longer exists.
    pub orphans_removed: Vec<String>,
}

pub struct SubscriptionService {
    provider: Arc<WeatherProvider>,
    users: Arc<dyn UserStore>,
    cities: Arc<dyn CityStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    registry: Arc<dyn ScheduleRegistry>,
    lang: String,
}

impl SubscriptionService {
    pub fn new(
        provider: Arc<WeatherProvider>,
        users: Arc<dyn UserStore>,
        cities: Arc<dyn CityStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        registry: Arc<dyn ScheduleRegistry>,
    ) -> Self {
        Self { provider, users, cities, subscriptions, registry, lang: "en".into() }
    }

    /// Geocoding language for city resolution.
    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = lang.to_string();
        self
    }

    pub fn registry(&self) -> &Arc<dyn ScheduleRegistry> {
        &self.registry
    }

    /// Subscribe `user` to periodic forecasts for `city_name`.
    pub async fn create(&self, user: &User, city_name: &str, period_minutes: u32) -> Result<Subscription> {
        check_period(period_minutes)?;
        let city_name = city_name.trim();
        if city_name.is_empty() {
            return Err(SkycastError::InvalidInput("city_name must not be empty".into()));
        }

        let city = self
            .provider
            .resolve_city(city_name, &self.lang)
            .await
            .map_err(|e| SkycastError::CityResolutionFailed {
                city: city_name.to_string(),
                cause: e.to_string(),
            })?;

        let sub = self
            .subscriptions
            .create_subscription(user.id, city.id, period_minutes)?;

        if let Err(e) = self.registry.register(&sub, &user.email, &city.name) {
            tracing::error!(
                "❗ Subscription {} exists but is unscheduled: {}",
                sub.id, e
            );
            return Err(e);
        }

        tracing::info!(
            "➕ Subscription {} created: user {} → {} every {} min",
            sub.id, user.id, city.name, period_minutes
        );
        Ok(sub)
    }

    /// Change the period. The schedule update is best-effort.
    pub fn update_period(&self, user: &User, id: i64, period_minutes: u32) -> Result<Subscription> {
        check_period(period_minutes)?;
        self.owned(user, id)?;

        let updated = self.subscriptions.update_period(id, period_minutes)?;
        self.registry.reconfigure(&updated)?;
        Ok(updated)
    }

    /// Unsubscribe. The schedule entry goes first so no new run can start
    /// for a row that is about to disappear.
    pub fn delete(&self, user: &User, id: i64) -> Result<()> {
        let sub = self.owned(user, id)?;
        self.registry.unregister(&sub)?;
        self.subscriptions.delete_subscription(id)?;
        tracing::info!("➖ Subscription {} deleted", id);
        Ok(())
    }

    /// The caller's subscriptions.
    pub fn list(&self, user: &User) -> Result<Vec<Subscription>> {
        self.subscriptions.list_subscriptions(Some(user.id))
    }

    /// One of the caller's subscriptions with its schedule entry, if any.
    pub fn get(&self, user: &User, id: i64) -> Result<(Subscription, Option<ScheduleEntry>)> {
        let sub = self.owned(user, id)?;
        let entry = self.registry.lookup(&sub)?;
        Ok((sub, entry))
    }

    /// Compare subscriptions against schedule entries.
    ///
    /// With `repair`, unscheduled subscriptions are registered again and
    /// entries without a subscription are removed. Without it, only reports.
    pub fn reconcile(&self, repair: bool) -> Result<ReconcileReport> {
        let subscriptions = self.subscriptions.list_subscriptions(None)?;
        let entries = self.registry.entries()?;
        let mut report = ReconcileReport::default();

        let live: HashSet<i64> = subscriptions.iter().map(|s| s.id).collect();
        for entry in entries.iter().filter(|e| !live.contains(&e.target)) {
            if repair && self.registry.remove_key(&entry.key)? {
                report.orphans_removed.push(entry.key.clone());
            }
        }

        for sub in &subscriptions {
            if self.registry.lookup(sub)?.is_some() {
                continue;
            }
            report.unscheduled.push(sub.id);
            if !repair {
                continue;
            }

            let user = self.users.get_user(sub.user_id)?;
            let city = self.cities.get_city(sub.city_id)?;
            match (user, city) {
                (Some(user), Some(city)) => {
                    self.registry.register(sub, &user.email, &city.name)?;
                    report.rescheduled.push(sub.id);
                }
                _ => tracing::warn!(
                    "⚠️ Cannot reschedule subscription {}: user or city missing",
                    sub.id
                ),
            }
        }

        if !report.unscheduled.is_empty() || !report.orphans_removed.is_empty() {
            tracing::warn!(
                "🧭 Reconcile: {} unscheduled, {} rescheduled, {} orphan(s) removed",
                report.unscheduled.len(),
                report.rescheduled.len(),
                report.orphans_removed.len()
            );
        }
        Ok(report)
    }

    fn owned(&self, user: &User, id: i64) -> Result<Subscription> {
        let sub = self
            .subscriptions
            .get_subscription(id)?
            .ok_or(SkycastError::SubscriptionNotFound(id))?;
        if sub.user_id != user.id {
            return Err(SkycastError::Forbidden(format!(
                "subscription {id} belongs to another user"
            )));
        }
        Ok(sub)
    }
}

fn check_period(period_minutes: u32) -> Result<()> {
    if period_minutes < 1 {
        return Err(SkycastError::InvalidInput(
            "period_minutes must be at least 1".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StoreRegistry;
    use crate::store::{MemoryScheduleStore, ScheduleStore};
    use crate::testlog::LogCapture;
    use crate::tasks::{FORECAST_TASK, Interval};
    use skycast_db::Database;
    use skycast_providers::StaticWeatherApi;
    use std::sync::Mutex;

    struct Harness {
        db: Arc<Database>,
        api: Arc<StaticWeatherApi>,
        store: Arc<MemoryScheduleStore>,
        service: SubscriptionService,
        user: User,
    }

    fn harness_with(registry: impl FnOnce(Arc<MemoryScheduleStore>, Arc<Database>) -> Arc<dyn ScheduleRegistry>) -> Harness {
        let api = Arc::new(StaticWeatherApi::new());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let provider = Arc::new(WeatherProvider::new(api.clone(), db.clone(), db.clone()));
        let store = Arc::new(MemoryScheduleStore::new());
        let registry = registry(store.clone(), db.clone());
        let service = SubscriptionService::new(provider, db.clone(), db.clone(), db.clone(), registry);
        let user = db.create_user("olena", "olena@example.com", "hash-olena").unwrap();
        Harness { db, api, store, service, user }
    }

    fn harness() -> Harness {
        harness_with(|store, _db| Arc::new(StoreRegistry::new(store)))
    }

    /// Registry that records calls and refuses to unregister a subscription
    /// whose row is already gone.
    struct OrderCheckingRegistry {
        inner: StoreRegistry,
        db: Arc<Database>,
        calls: Mutex<Vec<String>>,
    }

    impl ScheduleRegistry for OrderCheckingRegistry {
        fn register(&self, sub: &Subscription, email: &str, city: &str) -> Result<ScheduleEntry> {
            self.calls.lock().unwrap().push(format!("register:{}", sub.id));
            self.inner.register(sub, email, city)
        }

        fn reconfigure(&self, sub: &Subscription) -> Result<Option<ScheduleEntry>> {
            self.calls.lock().unwrap().push(format!("reconfigure:{}", sub.id));
            self.inner.reconfigure(sub)
        }

        fn unregister(&self, sub: &Subscription) -> Result<bool> {
            self.calls.lock().unwrap().push(format!("unregister:{}", sub.id));
            if self.db.get_subscription(sub.id)?.is_none() {
                return Err(SkycastError::Database("unregister after delete".into()));
            }
            self.inner.unregister(sub)
        }

        fn lookup(&self, sub: &Subscription) -> Result<Option<ScheduleEntry>> {
            self.inner.lookup(sub)
        }

        fn entries(&self) -> Result<Vec<ScheduleEntry>> {
            self.inner.entries()
        }

        fn remove_key(&self, key: &str) -> Result<bool> {
            self.inner.remove_key(key)
        }
    }

    /// Registry whose writes always fail.
    struct BrokenRegistry;

    impl ScheduleRegistry for BrokenRegistry {
        fn register(&self, _: &Subscription, _: &str, _: &str) -> Result<ScheduleEntry> {
            Err(SkycastError::Database("schedule store offline".into()))
        }
        fn reconfigure(&self, _: &Subscription) -> Result<Option<ScheduleEntry>> {
            Ok(None)
        }
        fn unregister(&self, _: &Subscription) -> Result<bool> {
            Ok(false)
        }
        fn lookup(&self, _: &Subscription) -> Result<Option<ScheduleEntry>> {
            Ok(None)
        }
        fn entries(&self) -> Result<Vec<ScheduleEntry>> {
            Ok(Vec::new())
        }
        fn remove_key(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_create_kyiv_registers_one_minute_entry() {
        let h = harness();
        let sub = h.service.create(&h.user, "Kyiv", 1).await.unwrap();
        assert_eq!(sub.period_minutes, 1);

        let entries = h.store.list().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.interval, Interval::minutes(1));
        assert_eq!(entry.task, FORECAST_TASK);
        assert_eq!(entry.target, sub.id);
        assert_eq!(entry.args.email, "olena@example.com");
        assert_eq!(entry.args.city, "Kyiv");
    }

    #[tokio::test]
    async fn test_duplicate_subscription_rejected() {
        let h = harness();
        h.service.create(&h.user, "Kyiv", 1).await.unwrap();
        let err = h.service.create(&h.user, "kyiv", 5).await.unwrap_err();
        assert!(matches!(err, SkycastError::DuplicateSubscription { .. }));
        assert_eq!(h.store.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_city_is_resolution_failure() {
        let h = harness();
        let err = h.service.create(&h.user, "Atlantis", 1).await.unwrap_err();
        assert!(matches!(err, SkycastError::CityResolutionFailed { ref city, .. } if city == "Atlantis"));
        assert!(h.db.list_subscriptions(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_outage_is_resolution_failure() {
        let h = harness();
        h.api.set_available(false);
        let err = h.service.create(&h.user, "Kyiv", 1).await.unwrap_err();
        assert!(matches!(err, SkycastError::CityResolutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let h = harness();
        let err = h.service.create(&h.user, "Kyiv", 0).await.unwrap_err();
        assert!(matches!(err, SkycastError::InvalidInput(_)));
        assert_eq!(h.api.geocode_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_period_reconfigures_entry() {
        let h = harness();
        let sub = h.service.create(&h.user, "Kyiv", 1).await.unwrap();
        let updated = h.service.update_period(&h.user, sub.id, 2).unwrap();
        assert_eq!(updated.period_minutes, 2);

        let (_, entry) = h.service.get(&h.user, sub.id).unwrap();
        assert_eq!(entry.unwrap().interval, Interval::minutes(2));
    }

    #[tokio::test]
    async fn test_update_period_with_missing_entry_still_succeeds() {
        let h = harness();
        let sub = h.service.create(&h.user, "Kyiv", 1).await.unwrap();
        let key = h.store.list().unwrap()[0].key.clone();
        h.store.remove(&key).unwrap();

        let logs = LogCapture::start();
        let updated = h.service.update_period(&h.user, sub.id, 2).unwrap();
        assert_eq!(updated.period_minutes, 2);
        assert_eq!(h.db.get_subscription(sub.id).unwrap().unwrap().period_minutes, 2);
        assert!(h.store.list().unwrap().is_empty());

        let out = logs.contents();
        assert!(out.contains("WARN"), "{out}");
        assert!(out.contains(&format!("No schedule entry '{key}'")), "{out}");
    }

    #[tokio::test]
    async fn test_delete_unregisters_before_removing_row() {
        let h = harness_with(|store, db| {
            Arc::new(OrderCheckingRegistry {
                inner: StoreRegistry::new(store),
                db,
                calls: Mutex::new(Vec::new()),
            })
        });
        let sub = h.service.create(&h.user, "Kyiv", 1).await.unwrap();
        h.service.delete(&h.user, sub.id).unwrap();

        assert!(h.db.get_subscription(sub.id).unwrap().is_none());
        assert!(h.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_subscription() {
        let h = harness();
        let sub = h.service.create(&h.user, "Kyiv", 1).await.unwrap();
        let mallory = h.db.create_user("mallory", "m@example.com", "hash-m").unwrap();

        assert!(matches!(
            h.service.update_period(&mallory, sub.id, 5),
            Err(SkycastError::Forbidden(_))
        ));
        assert!(matches!(h.service.delete(&mallory, sub.id), Err(SkycastError::Forbidden(_))));
        assert!(h.service.list(&mallory).unwrap().is_empty());
        assert_eq!(h.store.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_subscription_not_found() {
        let h = harness();
        assert!(matches!(
            h.service.delete(&h.user, 42),
            Err(SkycastError::SubscriptionNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_register_failure_leaves_unscheduled_row() {
        let h = harness_with(|_store, _db| Arc::new(BrokenRegistry));
        let err = h.service.create(&h.user, "Kyiv", 1).await.unwrap_err();
        assert!(matches!(err, SkycastError::Database(_)));
        assert_eq!(h.db.list_subscriptions(Some(h.user.id)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_repairs_both_directions() {
        let h = harness();
        let kyiv = h.service.create(&h.user, "Kyiv", 1).await.unwrap();
        let london = h.service.create(&h.user, "London", 3).await.unwrap();

        // Lose Kyiv's entry, orphan London's.
        let (_, kyiv_entry) = h.service.get(&h.user, kyiv.id).unwrap();
        h.store.remove(&kyiv_entry.unwrap().key).unwrap();
        h.db.delete_subscription(london.id).unwrap();

        let dry = h.service.reconcile(false).unwrap();
        assert_eq!(dry.unscheduled, vec![kyiv.id]);
        assert!(dry.rescheduled.is_empty());
        assert!(dry.orphans_removed.is_empty());
        assert_eq!(h.store.list().unwrap().len(), 1);

        let report = h.service.reconcile(true).unwrap();
        assert_eq!(report.rescheduled, vec![kyiv.id]);
        assert_eq!(report.orphans_removed.len(), 1);

        let entries = h.store.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, kyiv.id);
        assert_eq!(entries[0].args.city, "Kyiv");
    }
}
