//! Error types shared by every Skycast crate.

use thiserror::Error;

use crate::types::PipelineStage;

pub type Result<T> = std::result::Result<T, SkycastError>;

#[derive(Debug, Error)]
pub enum SkycastError {
    #[error("Weather provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("No geocoding match for '{0}'")]
    NotFound(String),

    #[error("City '{0}' is not registered")]
    CityNotRegistered(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("User {user_id} is already subscribed to city {city_id}")]
    DuplicateSubscription { user_id: i64, city_id: i64 },

    #[error("Schedule '{0}' already exists")]
    DuplicateSchedule(String),

    #[error("Schedule '{0}' not found")]
    ScheduleNotFound(String),

    #[error("Could not resolve city '{city}': {cause}")]
    CityResolutionFailed { city: String, cause: String },

    #[error("Pipeline failed at stage {stage}: {cause}")]
    PipelineFailed { stage: PipelineStage, cause: Box<SkycastError> },

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(i64),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job queue is full")]
    QueueFull,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SkycastError {
    /// Whether a runner may try the failed unit of work again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(_) | Self::DeliveryFailed(_) => true,
            Self::PipelineFailed { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }

    /// Wrap as a pipeline failure at `stage`.
    pub fn at_stage(self, stage: PipelineStage) -> Self {
        Self::PipelineFailed { stage, cause: Box::new(self) }
    }

    /// Stage tag when this error came out of the forecast pipeline.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::PipelineFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SkycastError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
