use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::models::{Listing, Price, SavedSearch};
use crate::notify::discord::{Embed, EmbedField, EmbedImage, WebhookMessage};
use crate::notify::{NotifyError, WebhookTransport};

/// Discord accepts at most 10 embeds per message
pub const DISCORD_MAX_EMBEDS: usize = 10;
/// Budget for delivering every chunk of one search's notification
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);
/// Discord embed title limit
const MAX_TITLE_CHARS: usize = 256;

/// Splits new listings into provider-sized messages and sends them in order
pub struct NotificationBatcher {
    transport: Arc<dyn WebhookTransport>,
    max_items: usize,
    deadline: Duration,
}

impl NotificationBatcher {
    pub fn new(transport: Arc<dyn WebhookTransport>, max_items: usize, deadline: Duration) -> Self {
        Self {
            transport,
            max_items: max_items.max(1),
            deadline,
        }
    }

    /// Send one message per chunk of `listings`.
    ///
    /// Chunks go out sequentially under a single deadline. The first failed
    /// delivery, or the deadline, stops the batch; chunks already sent stay sent.
    pub async fn notify(&self, listings: &[Listing], search: &SavedSearch) -> Result<(), NotifyError> {
        if listings.is_empty() {
            return Ok(());
        }

        let chunks: Vec<&[Listing]> = listings.chunks(self.max_items).collect();
        let total = chunks.len();
        let mut sent = 0;

        let outcome = tokio::time::timeout(self.deadline, async {
            for (index, chunk) in chunks.iter().enumerate() {
                let message = build_message(chunk, search, index, total);
                if let Err(e) = self.transport.deliver(&message).await {
                    warn!(search_id = search.id, batch = index + 1, total, error = %e, "Failed to send batch");
                    return Err(e);
                }
                sent += 1;
            }
            Ok(())
        })
        .await;

        match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(search_id = search.id, sent, total, "Notification deadline exceeded");
                return Err(NotifyError::DeadlineExceeded { sent, total });
            }
        }

        info!(search_id = search.id, messages = total, items = listings.len(), "Notification sent");
        Ok(())
    }
}

fn build_message(items: &[Listing], search: &SavedSearch, index: usize, total: usize) -> WebhookMessage {
    WebhookMessage {
        content: format_header(&search.name, items.len(), index, total),
        embeds: items.iter().map(build_embed).collect(),
    }
}

fn format_header(search_name: &str, item_count: usize, index: usize, total: usize) -> String {
    if total == 1 {
        format!("🔍 **{search_name}**: {item_count} new item(s) found")
    } else {
        format!("🔍 **{search_name}**: Batch {}/{total}", index + 1)
    }
}

fn build_embed(listing: &Listing) -> Embed {
    let mut fields = vec![EmbedField {
        name: "💰 Price".to_string(),
        value: format_price(&listing.price),
        inline: true,
    }];

    if let Some(size) = &listing.size_title {
        fields.push(EmbedField {
            name: "📏 Size".to_string(),
            value: size.clone(),
            inline: true,
        });
    }

    if let Some(brand) = &listing.brand_title {
        fields.push(EmbedField {
            name: "🏷️ Brand".to_string(),
            value: brand.clone(),
            inline: true,
        });
    }

    Embed {
        title: truncate_title(&listing.title, MAX_TITLE_CHARS),
        url: listing.url.clone(),
        fields,
        image: listing
            .photo_url
            .as_ref()
            .map(|url| EmbedImage { url: url.clone() }),
    }
}

fn format_price(price: &Price) -> String {
    if price.amount.is_empty() || price.currency_code.is_empty() {
        return "Price not available".to_string();
    }

    match price.currency_code.as_str() {
        "EUR" => format!("€{}", price.amount),
        "USD" => format!("${}", price.amount),
        "GBP" => format!("£{}", price.amount),
        code => format!("{} {}", price.amount, code),
    }
}

/// Cut to `max_chars` characters, ending in `...` when shortened.
fn truncate_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        return title.to_string();
    }
    let kept: String = title.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
