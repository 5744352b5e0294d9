//! Skycast configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SkycastError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkycastConfig {
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl SkycastConfig {
    /// Load config from the default path (~/.skycast/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SkycastError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SkycastError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SkycastError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Skycast home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".skycast")
    }

    /// Overlay secrets from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay secrets from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(key) = get("WEATHER_API_KEY") {
            self.weather.api_key = key;
        }
        if let Some(user) = get("EMAIL_HOST_USER") {
            self.email.username = user;
        }
        if let Some(password) = get("EMAIL_HOST_PASSWORD") {
            self.email.password = password;
        }
        if let Some(from) = get("DEFAULT_FROM_EMAIL") {
            self.email.from = from;
        }
    }
}

/// External weather API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// "openweather" or "static".
    #[serde(default = "default_weather_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_geo_url")]
    pub geo_url: String,
    #[serde(default = "default_weather_url")]
    pub weather_url: String,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_weather_provider() -> String { "openweather".into() }
fn default_geo_url() -> String { "https://api.openweathermap.org/geo/1.0/direct".into() }
fn default_weather_url() -> String { "https://api.openweathermap.org/data/2.5/weather".into() }
fn default_units() -> String { "metric".into() }
fn default_lang() -> String { "en".into() }
fn default_timeout_secs() -> u64 { 10 }

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: default_weather_provider(),
            api_key: String::new(),
            geo_url: default_geo_url(),
            weather_url: default_weather_url(),
            units: default_units(),
            lang: default_lang(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Outbound SMTP configuration. An empty `smtp_host` means "log only".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address; falls back to `username` when empty.
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_smtp_host() -> String { "smtp.gmail.com".into() }
fn default_smtp_port() -> u16 { 587 }
fn default_subject() -> String { "Your weather forecast".into() }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: String::new(),
            display_name: None,
            subject: default_subject(),
        }
    }
}

impl EmailConfig {
    /// Address used in the `From` header.
    pub fn sender(&self) -> &str {
        if self.from.is_empty() { &self.username } else { &self.from }
    }
}

/// Recurring-job runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_db")]
    pub db_path: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_scheduler_db() -> String { "~/.skycast/scheduler.db".into() }
fn default_check_interval() -> u64 { 10 }
fn default_max_concurrent() -> usize { 4 }
fn default_queue_capacity() -> usize { 256 }
fn default_max_retries() -> u32 { 2 }
fn default_retry_delay() -> u64 { 5 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            db_path: default_scheduler_db(),
            check_interval_secs: default_check_interval(),
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

/// Relational store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.skycast/skycast.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 8080 }
fn default_host() -> String { "0.0.0.0".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}
