//! # Skycast Channels
//! Rendering and delivery of forecast notifications.
//!
//! `render` builds the message, a [`Notifier`] delivers it. SMTP is the only
//! real transport; `LogNotifier` stands in when no SMTP host is configured.

pub mod email;
pub mod log;
pub mod render;

pub use email::EmailSender;
pub use log::LogNotifier;
pub use render::{render, render_with_subject};

use skycast_core::config::EmailConfig;
use skycast_core::traits::Notifier;
use std::sync::Arc;

/// Pick the delivery channel for the given email settings.
pub fn create_notifier(config: &EmailConfig) -> Arc<dyn Notifier> {
    if config.smtp_host.trim().is_empty() {
        tracing::warn!("📭 No SMTP host configured, forecasts will only be logged");
        Arc::new(LogNotifier::new())
    } else {
        Arc::new(EmailSender::new(config.clone()))
    }
}
