//! Domain types shared across crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user. Authentication only needs the id and the email address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A city row, created lazily on the first successful geocode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

/// One candidate returned by the geocoding API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMatch {
    pub name: String,
    #[serde(default)]
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

/// A user's subscription to periodic forecasts for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub city_id: i64,
    pub period_minutes: u32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Weather fields as reported by the provider. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub description: Option<String>,
    pub temp: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub clouds: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// Raw current-weather answer: the city name the provider matched plus the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub city_name: String,
    pub snapshot: WeatherSnapshot,
}

/// An immutable, append-only weather observation for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub id: i64,
    pub city_id: i64,
    pub observed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: WeatherSnapshot,
}

/// A rendered, deliverable notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// One step of the forecast pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    ResolveCity,
    ResolveWeather,
    RenderSend,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::ResolveCity => write!(f, "resolve_city"),
            PipelineStage::ResolveWeather => write!(f, "resolve_weather"),
            PipelineStage::RenderSend => write!(f, "render_send"),
        }
    }
}
