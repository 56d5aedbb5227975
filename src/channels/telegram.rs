//! Telegram Bot API channel.
//!
//! Sends messages via `POST /bot<token>/sendMessage`.  The same client backs
//! the public announcement chat and the admin chat; they differ only in the
//! target chat id and in whether the message is silent.
//!
//! Every send goes through [`send_with_retry`], and a `429` answer honours
//! the `parameters.retry_after` field from the response body.
//!
//! Texts go out in HTML parse mode, so they are escaped and cut to the
//! message limit before any markup is added; a cut never lands inside an
//! entity or a tag.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::retry::{send_with_retry, RetryPolicy};
use super::{AdminChannel, ChannelError, ChannelPoster, TELEGRAM_MESSAGE_LIMIT};
use crate::source::FeedItem;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Low-level Bot API client shared by the public and admin channels.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    token: Option<String>,
    retry: RetryPolicy,
}

impl TelegramClient {
    pub fn new(http: Client, token: Option<String>, retry: RetryPolicy) -> Self {
        Self { http, token, retry }
    }

    /// Send `text` (HTML parse mode) to `chat_id`, retrying per the policy.
    ///
    /// `text` must already be escaped and within [`TELEGRAM_MESSAGE_LIMIT`].
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        silent: bool,
    ) -> Result<(), ChannelError> {
        let Some(token) = self.token.as_deref() else {
            return Err(ChannelError::NotConfigured("TELEGRAM_TOKEN is not set".into()));
        };

        let url = format!("{TELEGRAM_API_BASE}/bot{token}/sendMessage");
        let payload = build_payload(chat_id, text, silent);
        let (url, payload) = (url.as_str(), &payload);

        send_with_retry(self.retry, "telegram.sendMessage", move |_| {
            self.send_once(url, payload)
        })
        .await?;

        let preview: String = text.chars().take(50).collect();
        info!(chat_id = %chat_id, silent, "Telegram message sent: {preview}...");
        Ok(())
    }

    async fn send_once(&self, url: &str, payload: &serde_json::Value) -> Result<(), ChannelError> {
        let response = self.http.post(url).json(payload).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let retry_after = body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(|v| v.as_u64())
                .map(Duration::from_secs);
            debug!(?retry_after, "Telegram rate limited (429)");
            return Err(ChannelError::RateLimited { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Status { status, body })
    }
}

fn build_payload(chat_id: &str, text: &str, silent: bool) -> serde_json::Value {
    let mut payload = json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "HTML",
    });
    if silent {
        payload["disable_notification"] = json!(true);
    }
    payload
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    escape_html_within(text, usize::MAX)
}

/// Escape `text` into at most `budget` characters.
///
/// When the escaped form does not fit, whole characters (never half an
/// entity) are dropped from the end and an ellipsis marks the cut.
pub fn escape_html_within(text: &str, budget: usize) -> String {
    if budget == 0 {
        return String::new();
    }
    let total: usize = text.chars().map(|c| entity(c).map_or(1, str::len)).sum();
    let limit = if total <= budget {
        budget
    } else {
        budget.saturating_sub(1)
    };

    let mut out = String::with_capacity(text.len());
    let mut used = 0;
    for c in text.chars() {
        let piece = entity(c);
        let len = piece.map_or(1, str::len);
        if used + len > limit {
            out.push('\u{2026}');
            break;
        }
        match piece {
            Some(e) => out.push_str(e),
            None => out.push(c),
        }
        used += len;
    }
    out
}

fn entity(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Public announcement chat
// ---------------------------------------------------------------------------

/// Announces new items in the public Telegram chat.
pub struct TelegramChannel {
    client: TelegramClient,
    chat_id: Option<String>,
    headline: String,
}

impl TelegramChannel {
    pub fn new(client: TelegramClient, chat_id: Option<String>, headline: impl Into<String>) -> Self {
        Self {
            client,
            chat_id,
            headline: headline.into(),
        }
    }

    /// Headline and link are kept whole; the title absorbs any cut.
    fn build_message(&self, item: &FeedItem) -> String {
        let head = format!("\u{1f525} <b>{}</b>\n", escape_html(&self.headline));
        let tail = format!("\n{}", escape_html(&item.url));
        let budget =
            TELEGRAM_MESSAGE_LIMIT.saturating_sub(head.chars().count() + tail.chars().count());
        format!("{head}{}{tail}", escape_html_within(&item.title, budget))
    }
}

#[async_trait]
impl ChannelPoster for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn post(&self, item: &FeedItem) -> Result<(), ChannelError> {
        let Some(chat_id) = self.chat_id.as_deref() else {
            return Err(ChannelError::NotConfigured(
                "TELEGRAM_PUBLIC_CHAT_ID is not set".into(),
            ));
        };
        self.client
            .send_message(chat_id, &self.build_message(item), false)
            .await
    }
}

// ---------------------------------------------------------------------------
// Admin chat
// ---------------------------------------------------------------------------

/// Heartbeats and alerts for the operator.
pub struct TelegramAdmin {
    client: TelegramClient,
    chat_id: Option<String>,
}

impl TelegramAdmin {
    pub fn new(client: TelegramClient, chat_id: Option<String>) -> Self {
        Self { client, chat_id }
    }
}

#[async_trait]
impl AdminChannel for TelegramAdmin {
    async fn send_admin(&self, text: &str, silent: bool) -> Result<(), ChannelError> {
        let Some(chat_id) = self.chat_id.as_deref() else {
            return Err(ChannelError::NotConfigured("ADMIN_CHAT_ID is not set".into()));
        };
        self.client
            .send_message(chat_id, &escape_html_within(text, TELEGRAM_MESSAGE_LIMIT), silent)
            .await
    }
}
