//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use skycast_channels::create_notifier;
use skycast_core::config::{GatewayConfig, SkycastConfig, WeatherConfig};
use skycast_db::Database;
use skycast_providers::{WeatherProvider, create_weather_api};
use skycast_scheduler::{
    ForecastPipeline, RetryPolicy, ScheduleStore, SchedulerDb, SchedulerEngine, StoreRegistry,
    SubscriptionService, WorkerPool, spawn_scheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    pub weather_config: WeatherConfig,
    pub start_time: Instant,
    pub db: Arc<Database>,
    pub provider: Arc<WeatherProvider>,
    pub subscriptions: Arc<SubscriptionService>,
    /// Recurring-job runner; also owns the worker pool counters.
    pub engine: Arc<SchedulerEngine>,
    pub check_interval_secs: u64,
}

/// Expand `~` in a configured path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

impl AppState {
    /// Open both databases and wire provider, pipeline, pool and runner.
    /// Must be called inside a tokio runtime (the pool spawns its dispatcher).
    pub fn from_config(config: &SkycastConfig) -> anyhow::Result<Self> {
        let db_path = expand_path(&config.database.path);
        let db = Arc::new(Database::open(&db_path)?);
        tracing::info!("💾 Database: {}", db_path.display());

        let sched_path = expand_path(&config.scheduler.db_path);
        let schedule_store: Arc<dyn ScheduleStore> = Arc::new(SchedulerDb::open(&sched_path)?);
        tracing::info!("💾 Schedule store: {}", sched_path.display());

        let api = create_weather_api(&config.weather)?;
        tracing::info!("🌦️ Weather provider: {}", api.name());
        let provider = Arc::new(WeatherProvider::new(api, db.clone(), db.clone()));

        let notifier = create_notifier(&config.email);
        let pipeline =
            Arc::new(ForecastPipeline::new(provider.clone(), notifier).with_config(config));
        let retry = RetryPolicy::new(
            config.scheduler.max_retries,
            Duration::from_secs(config.scheduler.retry_delay_secs),
        );
        let pool = WorkerPool::start(
            pipeline,
            config.scheduler.max_concurrent,
            config.scheduler.queue_capacity,
            retry,
        );
        let engine = Arc::new(SchedulerEngine::new(schedule_store.clone(), db.clone(), pool));

        let registry = Arc::new(StoreRegistry::new(schedule_store));
        let subscriptions = Arc::new(
            SubscriptionService::new(provider.clone(), db.clone(), db.clone(), db.clone(), registry)
                .with_lang(&config.weather.lang),
        );

        Ok(Self {
            gateway_config: config.gateway.clone(),
            weather_config: config.weather.clone(),
            start_time: Instant::now(),
            db,
            provider,
            subscriptions,
            engine,
            check_interval_secs: config.scheduler.check_interval_secs,
        })
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    // Protected routes: require a bearer token
    let protected = Router::new()
        .route("/api/v1/cities", get(super::routes::list_cities))
        .route("/api/v1/cities/{id}/weather", get(super::routes::city_weather))
        .route("/api/v1/weather", get(super::routes::current_weather))
        .route(
            "/api/v1/subscriptions",
            get(super::routes::list_subscriptions).post(super::routes::create_subscription),
        )
        .route(
            "/api/v1/subscriptions/{id}",
            get(super::routes::get_subscription)
                .put(super::routes::update_subscription)
                .patch(super::routes::update_subscription)
                .delete(super::routes::delete_subscription),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            super::auth::require_user,
        ));

    // Public routes: no auth
    let public = Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/users", post(super::routes::create_user));

    protected
        .merge(public)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(Duration::from_secs(3600));

            // Example: SKYCAST_CORS_ORIGINS=https://weather.example.com
            if let Ok(origins_str) = std::env::var("SKYCAST_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the scheduler loop and serve HTTP until shutdown.
pub async fn start(state: AppState) -> anyhow::Result<()> {
    let engine = state.engine.clone();
    let check_interval = state.check_interval_secs;
    tokio::spawn(async move {
        spawn_scheduler(engine, check_interval).await;
    });

    let addr = format!("{}:{}", state.gateway_config.host, state.gateway_config.port);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
