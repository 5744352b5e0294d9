//! External geocoding + current-weather API.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CurrentConditions, GeoMatch};

/// Client contract for a geocoding and weather HTTP API.
///
/// Implementations must map any non-2xx status or malformed payload to
/// `SkycastError::ProviderUnavailable` and must not retry.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    fn name(&self) -> &str;

    /// Candidates for a city name, in provider order. Empty means no match.
    async fn geocode(&self, city_name: &str, lang: &str) -> Result<Vec<GeoMatch>>;

    /// Current conditions at a coordinate.
    async fn current(
        &self,
        lat: f64,
        lon: f64,
        units: &str,
        lang: &str,
    ) -> Result<CurrentConditions>;
}
