//! API route handlers for the gateway.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use skycast_core::error::SkycastError;
use skycast_core::traits::{CityStore, UserStore};
use skycast_core::types::User;
use std::sync::Arc;

use super::auth::{generate_token, hash_token};
use super::server::AppState;

/// Error response: `{"ok": false, "error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub SkycastError);

impl From<SkycastError> for ApiError {
    fn from(e: SkycastError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            SkycastError::NotFound(_)
            | SkycastError::CityNotRegistered(_)
            | SkycastError::SubscriptionNotFound(_) => StatusCode::NOT_FOUND,
            SkycastError::DuplicateSubscription { .. } | SkycastError::DuplicateSchedule(_) => {
                StatusCode::CONFLICT
            }
            SkycastError::CityResolutionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SkycastError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SkycastError::Forbidden(_) => StatusCode::FORBIDDEN,
            SkycastError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            SkycastError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ {}", self.0);
        }
        (status, Json(json!({"ok": false, "error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let pool = state.engine.pool_stats();
    Json(json!({
        "status": "ok",
        "service": "skycast-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "weather_provider": state.provider.api_name(),
        "schedule_entries": state.engine.entry_count().ok(),
        "pool": pool,
    }))
}

// ── Users ──────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
}

/// Register a user. The token is returned once and never stored in clear.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let username = body.username.trim();
    let email = body.email.trim();
    if username.is_empty() {
        return Err(SkycastError::InvalidInput("username is required".into()).into());
    }
    if !email.contains('@') {
        return Err(SkycastError::InvalidInput(format!("invalid email address '{email}'")).into());
    }

    let token = generate_token();
    let user = state.db.create_user(username, email, &hash_token(&token))?;
    tracing::info!("👤 User registered: {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({"ok": true, "user": user, "token": token})),
    ))
}

// ── Cities & weather ──────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CityQuery {
    pub city_name: Option<String>,
}

/// Resolve `?city_name=` through the geocoder, or list cached cities.
pub async fn list_cities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CityQuery>,
) -> ApiResult<Json<Value>> {
    let name = query.city_name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        let cities = state.provider.cities()?;
        return Ok(Json(json!({"ok": true, "cities": cities})));
    }

    let city = state
        .provider
        .resolve_city(name, &state.weather_config.lang)
        .await?;
    Ok(Json(json!({"ok": true, "cities": [city]})))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Reading history of a city, newest first.
pub async fn city_weather(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let city = state
        .db
        .get_city(id)?
        .ok_or_else(|| SkycastError::NotFound(format!("city {id}")))?;
    let readings = state.provider.history(city.id, query.limit.unwrap_or(20).min(500))?;
    Ok(Json(json!({"ok": true, "city": city, "readings": readings})))
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub lat: f64,
    pub lon: f64,
}

/// Current weather at a coordinate. Appends a reading.
pub async fn current_weather(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WeatherQuery>,
) -> ApiResult<Json<Value>> {
    let reading = state
        .provider
        .resolve_weather(
            query.lat,
            query.lon,
            &state.weather_config.units,
            &state.weather_config.lang,
        )
        .await?;
    Ok(Json(json!({"ok": true, "reading": reading})))
}

// ── Subscriptions ──────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub city_name: String,
    pub period_minutes: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub period_minutes: u32,
}

pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Value>> {
    let subscriptions = state.subscriptions.list(&user)?;
    Ok(Json(json!({"ok": true, "subscriptions": subscriptions})))
}

pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(body): Json<CreateSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let sub = state
        .subscriptions
        .create(&user, &body.city_name, body.period_minutes)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({"ok": true, "subscription": sub}))))
}

/// One subscription with its schedule entry (`null` when unscheduled).
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let (sub, schedule) = state.subscriptions.get(&user, id)?;
    Ok(Json(json!({"ok": true, "subscription": sub, "schedule": schedule})))
}

pub async fn update_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateSubscriptionRequest>,
) -> ApiResult<Json<Value>> {
    let sub = state
        .subscriptions
        .update_period(&user, id, body.period_minutes)?;
    Ok(Json(json!({"ok": true, "subscription": sub})))
}

pub async fn delete_subscription(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    state.subscriptions.delete(&user, id)?;
    Ok(Json(json!({"ok": true})))
}
