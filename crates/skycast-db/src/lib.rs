//! # Skycast DB
//!
//! Relational storage behind the store traits in `skycast-core`.

pub mod sqlite;

pub use sqlite::Database;
