//! Discord webhook payloads and the HTTP transport that posts them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::notify::{NotifyError, WebhookTransport};

/// Discord webhook message payload
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

/// Rich entry rendered for one listing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
}

/// Key-value field for Discord embeds
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Full-size image for Discord embeds
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedImage {
    pub url: String,
}

/// Posts messages to a single Discord webhook URL
pub struct DiscordWebhook {
    webhook_url: String,
    client: Client,
}

impl DiscordWebhook {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(NotifyError::Transport)?;
        Ok(Self::with_client(webhook_url, client))
    }

    pub fn with_client(webhook_url: impl Into<String>, client: Client) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client,
        }
    }
}

#[async_trait]
impl WebhookTransport for DiscordWebhook {
    async fn deliver(&self, message: &WebhookMessage) -> Result<(), NotifyError> {
        if message.content.is_empty() {
            return Err(NotifyError::EmptyContent);
        }

        let response = self
            .client
            .post(&self.webhook_url)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Error posting to Discord");
                NotifyError::Transport(e)
            })?;

        let status = response.status();
        if status.is_success() {
            info!(status_code = status.as_u16(), "Message sent successfully to Discord");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read error response: {e}>"));
        error!(status_code = status.as_u16(), response_body = %body, "Failed to send message to Discord");
        Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
