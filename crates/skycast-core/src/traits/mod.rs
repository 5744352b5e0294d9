//! Seams between the pipeline and its external collaborators.

pub mod notifier;
pub mod store;
pub mod weather;

pub use notifier::Notifier;
pub use store::{CityStore, SubscriptionStore, UserStore, WeatherStore};
pub use weather::WeatherApi;
