//! OpenWeatherMap client.
//!
//! Two endpoints: direct geocoding (`/geo/1.0/direct`) and current weather
//! (`/data/2.5/weather`). Both authenticate with `appid` in the query string.
//! Every failure, HTTP or payload, is reported as `ProviderUnavailable`; this
//! layer never retries.

use async_trait::async_trait;
use serde::Deserialize;
use skycast_core::config::WeatherConfig;
use skycast_core::error::{Result, SkycastError};
use skycast_core::traits::WeatherApi;
use skycast_core::types::{CurrentConditions, GeoMatch, WeatherSnapshot};
use std::time::Duration;

/// HTTP client for the OpenWeatherMap geocoding and weather APIs.
pub struct OpenWeatherClient {
    api_key: String,
    geo_url: String,
    weather_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    name: String,
    #[serde(default)]
    weather: Vec<ConditionEntry>,
    main: MainBlock,
    #[serde(default)]
    clouds: Option<CloudsBlock>,
    #[serde(default)]
    wind: Option<WindBlock>,
}

#[derive(Debug, Deserialize)]
struct ConditionEntry {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    #[serde(default)]
    temp: Option<f64>,
    #[serde(default)]
    pressure: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CloudsBlock {
    #[serde(default)]
    all: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    #[serde(default)]
    speed: Option<f64>,
}

impl From<CurrentResponse> for CurrentConditions {
    fn from(resp: CurrentResponse) -> Self {
        Self {
            city_name: resp.name,
            snapshot: WeatherSnapshot {
                description: resp.weather.into_iter().next().and_then(|w| w.description),
                temp: resp.main.temp,
                pressure: resp.main.pressure,
                humidity: resp.main.humidity,
                clouds: resp.clouds.and_then(|c| c.all),
                wind_speed: resp.wind.and_then(|w| w.speed),
            },
        }
    }
}

impl OpenWeatherClient {
    /// Create from the `[weather]` config section.
    pub fn from_config(config: &WeatherConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(SkycastError::Config(
                "weather.api_key is empty (set WEATHER_API_KEY)".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SkycastError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            geo_url: config.geo_url.clone(),
            weather_url: config.weather_url.clone(),
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                SkycastError::ProviderUnavailable(format!(
                    "request to {url} failed: {}",
                    e.without_url()
                ))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SkycastError::ProviderUnavailable(format!(
                "openweather API error {status}: {text}"
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| {
                SkycastError::ProviderUnavailable(format!("malformed payload: {}", e.without_url()))
            })
    }
}

#[async_trait]
impl WeatherApi for OpenWeatherClient {
    fn name(&self) -> &str {
        "openweather"
    }

    async fn geocode(&self, city_name: &str, lang: &str) -> Result<Vec<GeoMatch>> {
        let matches: Vec<GeoMatch> = self
            .get_json(
                &self.geo_url,
                &[("q", city_name.to_string()), ("lang", lang.to_string())],
            )
            .await?;
        tracing::debug!("🌍 Geocode '{}' → {} candidate(s)", city_name, matches.len());
        Ok(matches)
    }

    async fn current(
        &self,
        lat: f64,
        lon: f64,
        units: &str,
        lang: &str,
    ) -> Result<CurrentConditions> {
        let resp: CurrentResponse = self
            .get_json(
                &self.weather_url,
                &[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("units", units.to_string()),
                    ("lang", lang.to_string()),
                ],
            )
            .await?;
        Ok(resp.into())
    }
}
