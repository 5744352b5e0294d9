//! Relational storage contracts.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{City, GeoMatch, Subscription, User, WeatherReading, WeatherSnapshot};

pub trait UserStore: Send + Sync {
    fn create_user(&self, username: &str, email: &str, token_hash: &str) -> Result<User>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn find_user_by_token(&self, token_hash: &str) -> Result<Option<User>>;
}

pub trait CityStore: Send + Sync {
    fn get_city(&self, id: i64) -> Result<Option<City>>;
    fn find_city_by_coords(&self, lat: f64, lon: f64) -> Result<Option<City>>;
    /// Row named `name` closest to `(lat, lon)`; lowest id on a tie.
    fn find_city_named_near(&self, name: &str, lat: f64, lon: f64) -> Result<Option<City>>;
    /// Insert keyed by `(lat, lon)`. An existing row with the same coordinates
    /// wins and is returned unchanged, including under concurrent callers.
    fn insert_city_if_absent(&self, city: &GeoMatch) -> Result<City>;
    fn list_cities(&self) -> Result<Vec<City>>;
}

pub trait WeatherStore: Send + Sync {
    fn append_reading(&self, city_id: i64, snapshot: &WeatherSnapshot) -> Result<WeatherReading>;
    /// Newest first.
    fn readings_for_city(&self, city_id: i64, limit: usize) -> Result<Vec<WeatherReading>>;
}

pub trait SubscriptionStore: Send + Sync {
    /// Fails with `DuplicateSubscription` when `(user_id, city_id)` already exists.
    fn create_subscription(
        &self,
        user_id: i64,
        city_id: i64,
        period_minutes: u32,
    ) -> Result<Subscription>;
    fn get_subscription(&self, id: i64) -> Result<Option<Subscription>>;
    /// All subscriptions, or only those of one user.
    fn list_subscriptions(&self, user_id: Option<i64>) -> Result<Vec<Subscription>>;
    fn update_period(&self, id: i64, period_minutes: u32) -> Result<Subscription>;
    fn delete_subscription(&self, id: i64) -> Result<bool>;
    fn touch_last_run(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;
}
