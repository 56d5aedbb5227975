//! YouTube channel feed source.
//!
//! YouTube publishes every channel as an Atom feed
//! (`/feeds/videos.xml?channel_id=...`), newest upload first.  Each entry
//! carries a namespaced id (`yt:video:<id>`), an `alternate` link to the
//! watch page and a `media:group` with the thumbnail.  Parsing is done by
//! [`feed_rs`], which also copes with plain RSS 2.0 should the URL point
//! somewhere else.

use anyhow::{Context, Result};
use async_trait::async_trait;
use feed_rs::model::Entry;
use reqwest::Client;
use tracing::{debug, warn};

use super::{FeedItem, FeedSource};

/// Build the canonical feed URL for a channel id.
pub fn channel_feed_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/feeds/videos.xml?channel_id={channel_id}")
}

/// A YouTube (or any Atom/RSS) feed polled over HTTP.
pub struct YoutubeFeed {
    client: Client,
    url: String,
}

impl YoutubeFeed {
    /// Create a new feed source.
    ///
    /// The `client` should already carry the daemon's request timeout so a
    /// hung fetch turns into an error instead of stalling the loop.
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Parse raw feed bytes and return the newest usable entry.
    ///
    /// This is a pure function (no I/O) so that tests can exercise the
    /// parsing logic without hitting the network.
    pub fn parse_latest(body: &[u8]) -> Result<Option<FeedItem>> {
        let feed = feed_rs::parser::parse(body).context("feed is not valid Atom/RSS")?;

        let Some(entry) = feed.entries.first() else {
            debug!("feed has no entries");
            return Ok(None);
        };

        Ok(entry_to_item(entry))
    }
}

/// Convert one parsed entry, or `None` when it lacks an id or a link.
fn entry_to_item(entry: &Entry) -> Option<FeedItem> {
    let Some(url) = alternate_link(entry) else {
        warn!(entry_id = %entry.id, "feed entry has no link, ignoring it");
        return None;
    };

    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "(untitled)".to_string());

    let thumbnail_url = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.trim())
        .find(|uri| !uri.is_empty())
        .map(String::from);

    let item = FeedItem::new(&entry.id, title, url, thumbnail_url);
    if item.id.is_empty() {
        warn!(raw_id = %entry.id, "feed entry has an empty id, ignoring it");
        return None;
    }
    Some(item)
}

/// Prefer the `alternate` link (the watch page), then any non-empty link.
fn alternate_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .filter(|l| !l.href.trim().is_empty())
        .find(|l| {
            l.rel
                .as_deref()
                .map_or(true, |rel| rel.eq_ignore_ascii_case("alternate"))
        })
        .or_else(|| entry.links.iter().find(|l| !l.href.trim().is_empty()))
        .map(|l| l.href.trim().to_string())
}

#[async_trait]
impl FeedSource for YoutubeFeed {
    fn name(&self) -> &str {
        "youtube"
    }

    async fn latest(&self) -> Result<Option<FeedItem>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", self.url))?
            .error_for_status()
            .with_context(|| format!("feed {} answered with an error status", self.url))?
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {}", self.url))?;

        debug!(url = %self.url, bytes = body.len(), "fetched feed");
        Self::parse_latest(body.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
