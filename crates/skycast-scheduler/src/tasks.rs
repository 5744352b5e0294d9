//! Schedule entry definitions: the data model for recurring forecast jobs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use skycast_core::types::Subscription;

/// Task identifier bound to every forecast entry.
pub const FORECAST_TASK: &str = "skycast.forecast";

/// Derive the schedule key for a subscription.
///
/// Stable for the lifetime of the subscription, so entries can be found for
/// update and delete without a secondary index.
pub fn schedule_key(user_id: i64, subscription_id: i64) -> String {
    format!("subscription:{user_id}:{subscription_id}")
}

/// Unit of an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Seconds => "seconds",
            IntervalUnit::Minutes => "minutes",
            IntervalUnit::Hours => "hours",
            IntervalUnit::Days => "days",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seconds" => Some(IntervalUnit::Seconds),
            "minutes" => Some(IntervalUnit::Minutes),
            "hours" => Some(IntervalUnit::Hours),
            "days" => Some(IntervalUnit::Days),
            _ => None,
        }
    }
}

/// How often an entry fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub every: u32,
    pub unit: IntervalUnit,
}

impl Interval {
    pub fn minutes(every: u32) -> Self {
        Self { every, unit: IntervalUnit::Minutes }
    }

    pub fn to_duration(&self) -> Duration {
        let every = i64::from(self.every);
        match self.unit {
            IntervalUnit::Seconds => Duration::seconds(every),
            IntervalUnit::Minutes => Duration::minutes(every),
            IntervalUnit::Hours => Duration::hours(every),
            IntervalUnit::Days => Duration::days(every),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "every {} {}", self.every, self.unit.as_str())
    }
}

/// Arguments handed to the forecast pipeline on each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastArgs {
    pub email: String,
    pub city: String,
}

/// A persisted recurring job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub key: String,
    pub interval: Interval,
    pub task: String,
    pub args: ForecastArgs,
    /// Subscription the entry belongs to.
    pub target: i64,
    pub start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: DateTime<Utc>,
    pub run_count: u32,
    pub enabled: bool,
}

impl ScheduleEntry {
    /// Forecast entry for a subscription, first due one interval after `start`.
    pub fn forecast(sub: &Subscription, email: &str, city: &str, start: DateTime<Utc>) -> Self {
        let interval = Interval::minutes(sub.period_minutes);
        Self {
            key: schedule_key(sub.user_id, sub.id),
            interval,
            task: FORECAST_TASK.to_string(),
            args: ForecastArgs { email: email.to_string(), city: city.to_string() },
            target: sub.id,
            start_time: start,
            created_at: start,
            last_run: None,
            next_run: start + interval.to_duration(),
            run_count: 0,
            enabled: true,
        }
    }

    /// Check if this entry should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run <= now
    }

    /// Record a dispatch at `now` and move `next_run` past it.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        self.run_count += 1;
        self.next_run = now + self.interval.to_duration();
    }

    /// Change the interval; the next run is recomputed from the last dispatch.
    pub fn set_interval(&mut self, interval: Interval) {
        self.interval = interval;
        let anchor = self.last_run.unwrap_or(self.start_time);
        self.next_run = anchor + interval.to_duration();
    }
}

/// Retry policy for failed pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: std::time::Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: std::time::Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, std::time::Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, std::time::Duration::from_secs(5))
    }
}
