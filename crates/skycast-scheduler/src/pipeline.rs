//! ForecastPipeline: resolve city, resolve weather, render and send.
//!
//! Each stage feeds the next and the first failure stops the chain. Errors
//! come back as `PipelineFailed` tagged with the stage that broke.

use skycast_channels::render::{DEFAULT_SUBJECT, render_with_subject};
use skycast_core::config::SkycastConfig;
use skycast_core::error::{Result, SkycastError};
use skycast_core::traits::Notifier;
use skycast_core::types::{Message, PipelineStage};
use skycast_providers::WeatherProvider;
use std::sync::Arc;

pub struct ForecastPipeline {
    provider: Arc<WeatherProvider>,
    notifier: Arc<dyn Notifier>,
    units: String,
    lang: String,
    subject: String,
}

impl ForecastPipeline {
    pub fn new(provider: Arc<WeatherProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            provider,
            notifier,
            units: "metric".into(),
            lang: "en".into(),
            subject: DEFAULT_SUBJECT.into(),
        }
    }

    /// Take units, language and subject from config.
    pub fn with_config(mut self, config: &SkycastConfig) -> Self {
        self.units = config.weather.units.clone();
        self.lang = config.weather.lang.clone();
        self.subject = config.email.subject.clone();
        self
    }

    /// Run all three stages for one recipient and return the delivered message.
    pub async fn run(&self, recipient: &str, city_name: &str) -> Result<Message> {
        let result = self.run_stages(recipient, city_name).await;
        if let Err(SkycastError::PipelineFailed { stage, cause }) = &result {
            tracing::error!(
                "❌ Forecast for {} ({}) failed at {}: {}",
                recipient, city_name, stage, cause
            );
        }
        result
    }

    async fn run_stages(&self, recipient: &str, city_name: &str) -> Result<Message> {
        let city = self
            .provider
            .resolve_city(city_name, &self.lang)
            .await
            .map_err(|e| e.at_stage(PipelineStage::ResolveCity))?;

        let reading = self
            .provider
            .resolve_weather(city.lat, city.lon, &self.units, &self.lang)
            .await
            .map_err(|e| e.at_stage(PipelineStage::ResolveWeather))?;

        let message = render_with_subject(&reading.snapshot, &city.name, &self.subject);
        self.notifier
            .send(&message, recipient)
            .await
            .map_err(|e| e.at_stage(PipelineStage::RenderSend))?;

        tracing::info!("✅ Forecast for {} sent to {}", city.name, recipient);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use skycast_channels::LogNotifier;
    use crate::testlog::LogCapture;
    use skycast_core::traits::{CityStore, WeatherStore};
    use skycast_db::Database;
    use skycast_providers::StaticWeatherApi;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingNotifier {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _message: &Message, _recipient: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Err(SkycastError::DeliveryFailed("connection refused".into()))
        }
    }

    fn setup(notifier: Arc<dyn Notifier>) -> (Arc<StaticWeatherApi>, Arc<Database>, ForecastPipeline) {
        let api = Arc::new(StaticWeatherApi::new());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let provider = Arc::new(WeatherProvider::new(api.clone(), db.clone(), db.clone()));
        (api, db, ForecastPipeline::new(provider, notifier))
    }

    #[tokio::test]
    async fn test_full_run_sends_one_message() {
        let notifier = Arc::new(LogNotifier::new());
        let (_api, db, pipeline) = setup(notifier.clone());

        let message = pipeline.run("olena@example.com", "Kyiv").await.unwrap();
        assert_eq!(message.subject, "Your weather forecast");
        assert!(message.body.contains("Description: clear sky"));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "olena@example.com");

        let kyiv = db.find_city_named_near("Kyiv", 50.45, 30.52).unwrap().unwrap();
        assert_eq!(db.readings_for_city(kyiv.id, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_outage_short_circuits() {
        let notifier = Arc::new(FailingNotifier { calls: AtomicU32::new(0) });
        let (api, _db, pipeline) = setup(notifier.clone());
        api.set_available(false);

        let err = pipeline.run("olena@example.com", "Kyiv").await.unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::ResolveCity));
        assert!(err.is_retryable());
        assert_eq!(api.current_calls(), 0);
        assert_eq!(notifier.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_unknown_city_fails_at_first_stage() {
        let notifier = Arc::new(LogNotifier::new());
        let (_api, _db, pipeline) = setup(notifier.clone());

        let err = pipeline.run("olena@example.com", "Atlantis").await.unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::ResolveCity));
        assert!(!err.is_retryable());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_tagged_render_send() {
        let notifier = Arc::new(FailingNotifier { calls: AtomicU32::new(0) });
        let (_api, _db, pipeline) = setup(notifier.clone());

        let err = pipeline.run("olena@example.com", "Kyiv").await.unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::RenderSend));
        assert!(matches!(
            err,
            SkycastError::PipelineFailed { ref cause, .. }
                if matches!(**cause, SkycastError::DeliveryFailed(_))
        ));
        assert_eq!(notifier.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_failure_logged_with_stage_and_cause() {
        let logs = LogCapture::start();
        let notifier = Arc::new(FailingNotifier { calls: AtomicU32::new(0) });
        let (_api, _db, pipeline) = setup(notifier);

        pipeline.run("olena@example.com", "Kyiv").await.unwrap_err();

        let out = logs.contents();
        assert!(out.contains("ERROR"), "{out}");
        assert!(out.contains("failed at render_send"), "{out}");
        assert!(out.contains("connection refused"), "{out}");
    }

    #[tokio::test]
    async fn test_outage_logged_at_first_stage() {
        let logs = LogCapture::start();
        let (api, _db, pipeline) = setup(Arc::new(LogNotifier::new()));
        api.set_available(false);

        pipeline.run("olena@example.com", "Kyiv").await.unwrap_err();

        let out = logs.contents();
        assert!(out.contains("failed at resolve_city"), "{out}");
        assert!(out.contains("Weather provider unavailable"), "{out}");
    }
}
