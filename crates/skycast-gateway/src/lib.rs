//! # Skycast Gateway
//! HTTP API: user registration, city and weather lookups, subscription CRUD.

pub mod auth;
pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
