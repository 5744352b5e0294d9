//! Outbound notification channel.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Message;

/// Delivers one rendered message to one recipient.
///
/// Transport errors surface as `SkycastError::DeliveryFailed`; no internal retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &Message, recipient: &str) -> Result<()>;
}
