pub mod batcher;
pub mod discord;

pub use batcher::NotificationBatcher;
pub use discord::{DiscordWebhook, WebhookMessage};

use async_trait::async_trait;
use thiserror::Error;

/// Delivery failures for outbound notifications
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("message content cannot be empty")]
    EmptyContent,

    #[error("failed to send webhook request: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("webhook rejected message (status: {status}): {body}")]
    Status { status: u16, body: String },

    #[error("notification deadline exceeded after {sent}/{total} message(s)")]
    DeadlineExceeded { sent: usize, total: usize },
}

/// Channel that accepts one rendered notification message at a time
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn deliver(&self, message: &WebhookMessage) -> Result<(), NotifyError>;
}
