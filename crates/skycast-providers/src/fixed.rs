//! Offline weather source with a fixed catalog.
//!
//! Selected with `weather.provider = "static"` for local runs without an API
//! key. Availability can be toggled at runtime so outage handling can be
//! exercised end to end.

use async_trait::async_trait;
use skycast_core::error::{Result, SkycastError};
use skycast_core::traits::WeatherApi;
use skycast_core::types::{CurrentConditions, GeoMatch, WeatherSnapshot};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

struct Entry {
    city: GeoMatch,
    snapshot: WeatherSnapshot,
}

/// Fixed-catalog implementation of [`WeatherApi`].
pub struct StaticWeatherApi {
    entries: Mutex<Vec<Entry>>,
    available: AtomicBool,
    geocode_calls: AtomicU32,
    current_calls: AtomicU32,
}

impl StaticWeatherApi {
    /// Empty catalog.
    pub fn empty() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
            geocode_calls: AtomicU32::new(0),
            current_calls: AtomicU32::new(0),
        }
    }

    /// Catalog seeded with a handful of capitals.
    pub fn new() -> Self {
        let api = Self::empty();
        let seed = [
            ("Kyiv", "UA", 50.45, 30.52, "clear sky", 18.0),
            ("London", "GB", 51.51, -0.13, "light rain", 12.5),
            ("Lisbon", "PT", 38.72, -9.14, "few clouds", 21.0),
        ];
        for (name, country, lat, lon, description, temp) in seed {
            api.add_city(
                GeoMatch { name: name.into(), country: country.into(), lat, lon },
                WeatherSnapshot {
                    description: Some(description.into()),
                    temp: Some(temp),
                    pressure: Some(1013.0),
                    humidity: Some(60.0),
                    clouds: Some(20.0),
                    wind_speed: Some(3.0),
                },
            );
        }
        api
    }

    /// Add or replace a city and the conditions it reports.
    pub fn add_city(&self, city: GeoMatch, snapshot: WeatherSnapshot) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|e| !(e.city.lat == city.lat && e.city.lon == city.lon));
            entries.push(Entry { city, snapshot });
        }
    }

    /// Simulate an outage: every call fails with `ProviderUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn geocode_calls(&self) -> u32 {
        self.geocode_calls.load(Ordering::Relaxed)
    }

    pub fn current_calls(&self) -> u32 {
        self.current_calls.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(SkycastError::ProviderUnavailable("static source is offline".into()))
        }
    }
}

impl Default for StaticWeatherApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherApi for StaticWeatherApi {
    fn name(&self) -> &str {
        "static"
    }

    async fn geocode(&self, city_name: &str, _lang: &str) -> Result<Vec<GeoMatch>> {
        self.geocode_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let entries = self
            .entries
            .lock()
            .map_err(|e| SkycastError::ProviderUnavailable(format!("lock: {e}")))?;
        Ok(entries
            .iter()
            .filter(|e| e.city.name.eq_ignore_ascii_case(city_name))
            .map(|e| e.city.clone())
            .collect())
    }

    async fn current(
        &self,
        lat: f64,
        lon: f64,
        _units: &str,
        _lang: &str,
    ) -> Result<CurrentConditions> {
        self.current_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        let entries = self
            .entries
            .lock()
            .map_err(|e| SkycastError::ProviderUnavailable(format!("lock: {e}")))?;
        entries
            .iter()
            .find(|e| e.city.lat == lat && e.city.lon == lon)
            .map(|e| CurrentConditions {
                city_name: e.city.name.clone(),
                snapshot: e.snapshot.clone(),
            })
            .ok_or_else(|| {
                SkycastError::ProviderUnavailable(format!("no observation at ({lat}, {lon})"))
            })
    }
}
