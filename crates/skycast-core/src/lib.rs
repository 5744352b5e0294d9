//! # Skycast Core
//!
//! Configuration, error type, domain model and the traits the other crates
//! implement.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::SkycastConfig;
pub use error::{Result, SkycastError};
pub use types::*;
