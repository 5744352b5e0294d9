//! # Skycast Scheduler
//!
//! Everything between a subscription and the email it produces.
//!
//! ## Architecture
//! ```text
//! SubscriptionService (create / update / delete)
//!   └── ScheduleRegistry → ScheduleStore (SQLite)
//!
//! SchedulerEngine (tokio interval)
//!   ├── due entry → advance, stamp last_run_at
//!   └── ForecastJob → WorkerPool (bounded, retries)
//!                       └── ForecastPipeline
//!                             ├── resolve_city
//!                             ├── resolve_weather
//!                             └── render + send
//! ```

pub mod engine;
pub mod persistence;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod store;
pub mod subscriptions;
pub mod tasks;

#[cfg(test)]
mod testlog;

pub use engine::{SchedulerEngine, spawn_scheduler};
pub use persistence::SchedulerDb;
pub use pipeline::ForecastPipeline;
pub use pool::{ForecastJob, PoolSnapshot, WorkerPool};
pub use registry::{ScheduleRegistry, StoreRegistry};
pub use store::{MemoryScheduleStore, ScheduleStore};
pub use subscriptions::{ReconcileReport, SubscriptionService};
pub use tasks::{Interval, IntervalUnit, RetryPolicy, ScheduleEntry, schedule_key};
