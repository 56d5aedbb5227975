//! Feed source abstraction layer.
//!
//! This module defines the [`FeedSource`] trait and the common [`FeedItem`]
//! type.  The only concrete source is [`YoutubeFeed`], which reads a
//! channel's Atom feed.
//!
//! ## For contributors — adding a new source
//!
//! 1. Create a new file in this directory (e.g. `podcast.rs`).
//! 2. Define a struct and implement [`FeedSource`] for it.
//! 3. Add `mod podcast;` below and re-export your struct.
//! 4. Construct it in `main.rs` instead of `YoutubeFeed`.
//!
//! The scheduler, de-duplication and channels are all source-agnostic.

mod feed_item;
mod youtube;

pub use feed_item::FeedItem;
pub use youtube::{channel_feed_url, YoutubeFeed};

use anyhow::Result;
use async_trait::async_trait;

/// Trait that every feed source must implement.
///
/// The scheduler calls [`latest()`](FeedSource::latest) once per poll, so
/// implementations must be [`Send`] + [`Sync`].
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Short label used in log lines.
    fn name(&self) -> &str;

    /// Fetch the feed and return its newest entry.
    ///
    /// `Ok(None)` means the feed was readable but held no usable entry.
    /// Errors cover transport and parse failures; the scheduler treats both
    /// the same way ("no new item this cycle").
    async fn latest(&self) -> Result<Option<FeedItem>>;
}
