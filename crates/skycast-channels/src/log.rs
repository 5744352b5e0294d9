//! Log-only notifier for local runs without SMTP.

use async_trait::async_trait;
use skycast_core::error::Result;
use skycast_core::traits::Notifier;
use skycast_core::types::Message;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Messages kept by [`LogNotifier::new`].
pub const DEFAULT_OUTBOX_CAPACITY: usize = 100;

/// Writes each message to the log and keeps the most recent ones in an
/// in-process outbox. Older messages are evicted once the outbox is full.
pub struct LogNotifier {
    outbox: Mutex<VecDeque<(String, Message)>>,
    capacity: usize,
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` messages; zero keeps none.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { outbox: Mutex::new(VecDeque::with_capacity(capacity.min(1024))), capacity }
    }

    /// Most recent messages, oldest first, as `(recipient, message)` pairs.
    pub fn sent(&self) -> Vec<(String, Message)> {
        self.outbox
            .lock()
            .map(|o| o.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &Message, recipient: &str) -> Result<()> {
        tracing::info!("📝 [{}] → {}\n{}", message.subject, recipient, message.body);
        if self.capacity == 0 {
            return Ok(());
        }
        if let Ok(mut outbox) = self.outbox.lock() {
            while outbox.len() >= self.capacity {
                outbox.pop_front();
            }
            outbox.push_back((recipient.to_string(), message.clone()));
        }
        Ok(())
    }
}
