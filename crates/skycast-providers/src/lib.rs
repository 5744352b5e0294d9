//! # Skycast Providers
//!
//! Weather data sources. `OpenWeatherClient` talks to OpenWeatherMap,
//! `StaticWeatherApi` serves a fixed catalog for offline runs. Both sit behind
//! the `WeatherApi` trait and are wrapped by `WeatherProvider`, which adds the
//! city cache and reading history.

pub mod fixed;
pub mod openweather;
pub mod provider;

pub use fixed::StaticWeatherApi;
pub use openweather::OpenWeatherClient;
pub use provider::WeatherProvider;

use skycast_core::config::WeatherConfig;
use skycast_core::error::{Result, SkycastError};
use skycast_core::traits::WeatherApi;
use std::sync::Arc;

/// Create a weather API client from configuration.
pub fn create_weather_api(config: &WeatherConfig) -> Result<Arc<dyn WeatherApi>> {
    match config.provider.as_str() {
        "openweather" => Ok(Arc::new(OpenWeatherClient::from_config(config)?)),
        "static" => Ok(Arc::new(StaticWeatherApi::new())),
        other => Err(SkycastError::Config(format!("Unknown weather provider: {other}"))),
    }
}

/// List all available provider names.
pub fn available_providers() -> Vec<&'static str> {
    vec!["openweather", "static"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_static_provider() {
        let config = WeatherConfig { provider: "static".into(), ..Default::default() };
        let api = create_weather_api(&config).unwrap();
        assert_eq!(api.name(), "static");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = WeatherConfig { provider: "darksky".into(), ..Default::default() };
        assert!(matches!(create_weather_api(&config), Err(SkycastError::Config(_))));
    }

    #[test]
    fn test_available_providers() {
        assert!(available_providers().contains(&"openweather"));
    }
}
