//! Forecast message rendering.

use skycast_core::types::{Message, WeatherSnapshot};

/// Subject used when none is configured.
pub const DEFAULT_SUBJECT: &str = "Your weather forecast";

/// Render a forecast with the default subject.
pub fn render(snapshot: &WeatherSnapshot, city_name: &str) -> Message {
    render_with_subject(snapshot, city_name, DEFAULT_SUBJECT)
}

/// Render a forecast. Missing fields render as empty values.
pub fn render_with_subject(snapshot: &WeatherSnapshot, city_name: &str, subject: &str) -> Message {
    let body = format!(
        "Weather forecast for {city_name}\n\
         \n\
         City: {city_name}\n\
         Description: {}\n\
         Temperature: {}\n\
         Pressure: {}\n\
         Humidity: {}\n\
         Clouds: {}\n\
         Wind speed: {}\n",
        snapshot.description.as_deref().unwrap_or_default(),
        number(snapshot.temp),
        number(snapshot.pressure),
        number(snapshot.humidity),
        number(snapshot.clouds),
        number(snapshot.wind_speed),
    );

    Message { subject: subject.to_string(), body }
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kyiv() -> WeatherSnapshot {
        WeatherSnapshot {
            description: Some("clear sky".into()),
            temp: Some(18.0),
            pressure: Some(1013.0),
            humidity: Some(45.0),
            clouds: Some(0.0),
            wind_speed: Some(3.5),
        }
    }

    #[test]
    fn test_render_full_snapshot() {
        let msg = render(&kyiv(), "Kyiv");
        assert_eq!(msg.subject, "Your weather forecast");
        assert!(msg.body.contains("City: Kyiv\n"));
        assert!(msg.body.contains("Description: clear sky\n"));
        assert!(msg.body.contains("Temperature: 18\n"));
        assert!(msg.body.contains("Wind speed: 3.5\n"));
    }

    #[test]
    fn test_missing_wind_renders_empty() {
        let snapshot = WeatherSnapshot { wind_speed: None, ..kyiv() };
        let msg = render(&snapshot, "Kyiv");
        assert!(msg.body.contains("Wind speed: \n"));
        assert!(msg.body.contains("Pressure: 1013\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let empty = WeatherSnapshot::default();
        assert_eq!(render(&empty, "Lisbon"), render(&empty, "Lisbon"));
        assert!(render(&empty, "Lisbon").body.contains("Description: \n"));
    }

    #[test]
    fn test_custom_subject() {
        let msg = render_with_subject(&kyiv(), "Kyiv", "Daily weather");
        assert_eq!(msg.subject, "Daily weather");
    }
}
