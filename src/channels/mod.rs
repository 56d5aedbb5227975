//! Outbound notification channels.
//!
//! Each channel turns a [`FeedItem`] into one publish call:
//! - Telegram Bot API (public announcement chat, plus the admin chat)
//! - Facebook Page (photo post or link post)
//! - Instagram business account (create-then-publish media)
//!
//! Only the Telegram calls are retried (see [`retry`]); the Meta flows make
//! a single attempt because they are multi-step and carry no idempotency key.

mod facebook;
mod instagram;
pub mod retry;
mod telegram;

pub use facebook::FacebookChannel;
pub use instagram::InstagramChannel;
pub use retry::RetryPolicy;
pub use telegram::{TelegramAdmin, TelegramChannel, TelegramClient};

use async_trait::async_trait;
use thiserror::Error;

use crate::source::FeedItem;

/// Telegram `sendMessage` text limit (characters).
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Instagram caption limit (characters).
pub const INSTAGRAM_CAPTION_LIMIT: usize = 2200;

/// Why a single channel did not deliver.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Credentials or targets are missing; the channel is skipped.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The item lacks something this channel needs (e.g. an image).
    #[error("skipped: {0}")]
    Unsupported(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<std::time::Duration> },

    #[error("API error: {0}")]
    Api(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

impl ChannelError {
    /// Skips are expected degradations, logged at WARN rather than ERROR.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::NotConfigured(_) | Self::Unsupported(_))
    }
}

/// One publish destination for new items.
#[async_trait]
pub trait ChannelPoster: Send + Sync {
    /// Stable identifier used in logs and outcomes.
    fn name(&self) -> &'static str;

    /// Publish `item`.  Implementations apply their own retry policy.
    async fn post(&self, item: &FeedItem) -> Result<(), ChannelError>;
}

/// The operator-facing chat used for heartbeats and alerts.
#[async_trait]
pub trait AdminChannel: Send + Sync {
    /// Send `text` to the admin chat; `silent` suppresses the alert sound.
    async fn send_admin(&self, text: &str, silent: bool) -> Result<(), ChannelError>;
}

/// The announcement body shared by every channel (plain text).
pub fn announcement(headline: &str, item: &FeedItem) -> String {
    format!("{headline}\n\n{}\n\n{}", item.title, item.url)
}

/// Truncate `text` to at most `limit` characters, marking the cut.
pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit.saturating_sub(suffix.chars().count());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}

/// One form-encoded Graph API call; a non-2xx answer becomes
/// [`ChannelError::Status`] carrying the API's error message.
pub(crate) async fn graph_post(
    http: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
) -> Result<serde_json::Value, ChannelError> {
    let response = http.post(url).form(form).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ChannelError::Status {
            status,
            body: graph_error_message(&body),
        });
    }
    Ok(serde_json::from_str(&body).unwrap_or_default())
}

/// Read the Graph API's `{"error": {"message": ..}}` body, falling back to
/// the raw text.
pub(crate) fn graph_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_layout() {
        let item = FeedItem::new("abc", "A title", "https://youtu.be/abc", None);
        assert_eq!(
            announcement("New video!", &item),
            "New video!\n\nA title\n\nhttps://youtu.be/abc"
        );
    }

    #[test]
    fn truncate_leaves_short_text_alone() {
        assert_eq!(truncate_message("hello", 100), "hello");
    }

    #[test]
    fn truncate_respects_limit() {
        let long = "ж".repeat(5000);
        let truncated = truncate_message(&long, TELEGRAM_MESSAGE_LIMIT);
        assert_eq!(truncated.chars().count(), TELEGRAM_MESSAGE_LIMIT);
        assert!(truncated.ends_with("[truncated]"));
    }

    #[test]
    fn skip_classification() {
        assert!(ChannelError::NotConfigured("x".into()).is_skip());
        assert!(ChannelError::Unsupported("x".into()).is_skip());
        assert!(!ChannelError::Api("x".into()).is_skip());
        assert!(!ChannelError::Panicked("x".into()).is_skip());
    }

    #[test]
    fn graph_error_message_extracts_message() {
        let body = r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#;
        assert_eq!(graph_error_message(body), "Invalid OAuth access token.");
        assert_eq!(graph_error_message("plain failure"), "plain failure");
    }
}
