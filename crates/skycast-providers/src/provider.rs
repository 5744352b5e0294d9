//! WeatherProvider: geocoding and weather lookups backed by persistence.
//!
//! `resolve_city` caches cities by coordinate, `resolve_weather` appends one
//! reading per call. Neither retries; callers own the retry policy.

use skycast_core::error::{Result, SkycastError};
use skycast_core::traits::{CityStore, WeatherApi, WeatherStore};
use skycast_core::types::{City, WeatherReading};
use std::sync::Arc;

pub struct WeatherProvider {
    api: Arc<dyn WeatherApi>,
    cities: Arc<dyn CityStore>,
    readings: Arc<dyn WeatherStore>,
}

impl WeatherProvider {
    pub fn new(
        api: Arc<dyn WeatherApi>,
        cities: Arc<dyn CityStore>,
        readings: Arc<dyn WeatherStore>,
    ) -> Self {
        Self { api, cities, readings }
    }

    pub fn api_name(&self) -> &str {
        self.api.name()
    }

    /// Geocode `name` and return its city row, creating it on first sight.
    ///
    /// The first candidate wins. A row that already exists at the same
    /// coordinates is returned as-is and never overwritten.
    pub async fn resolve_city(&self, name: &str, lang: &str) -> Result<City> {
        let candidates = self.api.geocode(name, lang).await?;
        let first = candidates
            .into_iter()
            .next()
            .ok_or_else(|| SkycastError::NotFound(name.to_string()))?;

        if let Some(existing) = self.cities.find_city_by_coords(first.lat, first.lon)? {
            return Ok(existing);
        }

        let city = self.cities.insert_city_if_absent(&first)?;
        tracing::info!(
            "🏙️ City cached: {} ({}) at ({}, {}) → id {}",
            city.name, city.country, city.lat, city.lon, city.id
        );
        Ok(city)
    }

    /// Fetch current conditions at a coordinate and append a reading.
    ///
    /// The provider's reported city name must match a registered city; among
    /// rows sharing that name the one nearest to `(lat, lon)` gets the reading.
    pub async fn resolve_weather(
        &self,
        lat: f64,
        lon: f64,
        units: &str,
        lang: &str,
    ) -> Result<WeatherReading> {
        let current = self.api.current(lat, lon, units, lang).await?;
        let city = self
            .cities
            .find_city_named_near(&current.city_name, lat, lon)?
            .ok_or_else(|| SkycastError::CityNotRegistered(current.city_name.clone()))?;

        let reading = self.readings.append_reading(city.id, &current.snapshot)?;
        tracing::debug!("🌡️ Reading {} stored for city {}", reading.id, city.id);
        Ok(reading)
    }

    /// Most recent readings for a city, newest first.
    pub fn history(&self, city_id: i64, limit: usize) -> Result<Vec<WeatherReading>> {
        self.readings.readings_for_city(city_id, limit)
    }

    /// All cached cities.
    pub fn cities(&self) -> Result<Vec<City>> {
        self.cities.list_cities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::StaticWeatherApi;
    use skycast_core::types::{GeoMatch, WeatherSnapshot};
    use skycast_db::Database;

    fn setup() -> (Arc<StaticWeatherApi>, Arc<Database>, WeatherProvider) {
        let api = Arc::new(StaticWeatherApi::new());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let provider = WeatherProvider::new(api.clone(), db.clone(), db.clone());
        (api, db, provider)
    }

    #[tokio::test]
    async fn test_resolve_city_twice_creates_one_row() {
        let (_api, db, provider) = setup();
        let first = provider.resolve_city("Kyiv", "en").await.unwrap();
        let second = provider.resolve_city("Kyiv", "en").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(db.list_cities().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_city_picks_first_candidate() {
        let api = Arc::new(StaticWeatherApi::empty());
        api.add_city(
            GeoMatch { name: "Paris".into(), country: "FR".into(), lat: 48.85, lon: 2.35 },
            WeatherSnapshot::default(),
        );
        api.add_city(
            GeoMatch { name: "Paris".into(), country: "US".into(), lat: 33.66, lon: -95.55 },
            WeatherSnapshot::default(),
        );
        let db = Arc::new(Database::open_in_memory().unwrap());
        let provider = WeatherProvider::new(api, db.clone(), db.clone());

        let city = provider.resolve_city("Paris", "en").await.unwrap();
        assert_eq!(city.country, "FR");
    }

    #[tokio::test]
    async fn test_resolve_city_not_found() {
        let (_api, db, provider) = setup();
        let err = provider.resolve_city("Atlantis", "en").await.unwrap_err();
        assert!(matches!(err, SkycastError::NotFound(name) if name == "Atlantis"));
        assert!(db.list_cities().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_city_does_not_overwrite_existing_row() {
        let (api, db, provider) = setup();
        let original = provider.resolve_city("Kyiv", "en").await.unwrap();
        api.add_city(
            GeoMatch { name: "Kiev".into(), country: "UA".into(), lat: 50.45, lon: 30.52 },
            WeatherSnapshot::default(),
        );
        let again = provider.resolve_city("Kiev", "en").await.unwrap();
        assert_eq!(again, original);
        assert_eq!(db.get_city(original.id).unwrap().unwrap().name, "Kyiv");
    }

    #[tokio::test]
    async fn test_resolve_weather_appends_one_reading() {
        let (_api, db, provider) = setup();
        let kyiv = provider.resolve_city("Kyiv", "en").await.unwrap();

        let reading = provider.resolve_weather(50.45, 30.52, "metric", "en").await.unwrap();
        assert_eq!(reading.city_id, kyiv.id);
        assert_eq!(reading.snapshot.description.as_deref(), Some("clear sky"));
        assert_eq!(reading.snapshot.temp, Some(18.0));
        assert_eq!(db.readings_for_city(kyiv.id, 10).unwrap().len(), 1);

        provider.resolve_weather(50.45, 30.52, "metric", "en").await.unwrap();
        assert_eq!(provider.history(kyiv.id, 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_weather_requires_registered_city() {
        let (_api, _db, provider) = setup();
        let err = provider
            .resolve_weather(50.45, 30.52, "metric", "en")
            .await
            .unwrap_err();
        assert!(matches!(err, SkycastError::CityNotRegistered(_)));
    }

    #[tokio::test]
    async fn test_outage_propagates_without_retry() {
        let (api, _db, provider) = setup();
        api.set_available(false);
        let err = provider.resolve_city("Kyiv", "en").await.unwrap_err();
        assert!(matches!(err, SkycastError::ProviderUnavailable(_)));
        assert_eq!(api.geocode_calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_weather_picks_row_at_requested_coordinates() {
        let api = Arc::new(StaticWeatherApi::empty());
        let paris_fr = GeoMatch { name: "Paris".into(), country: "FR".into(), lat: 48.85, lon: 2.35 };
        let paris_us =
            GeoMatch { name: "Paris".into(), country: "US".into(), lat: 33.66, lon: -95.55 };
        api.add_city(paris_fr.clone(), WeatherSnapshot::default());
        api.add_city(paris_us.clone(), WeatherSnapshot::default());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let provider = WeatherProvider::new(api, db.clone(), db.clone());
        let fr = db.insert_city_if_absent(&paris_fr).unwrap();
        let us = db.insert_city_if_absent(&paris_us).unwrap();

        let reading = provider.resolve_weather(33.66, -95.55, "metric", "en").await.unwrap();
        assert_eq!(reading.city_id, us.id);
        assert!(db.readings_for_city(fr.id, 10).unwrap().is_empty());
        assert_eq!(db.readings_for_city(us.id, 10).unwrap().len(), 1);
    }
}
