//! The item record handed from the feed source to the rest of the daemon.
//!
//! `FeedItem` is the normalised form of one feed entry.  It is built fresh on
//! every poll and never mutated afterwards; the scheduler only looks at its
//! `id`, the channels only look at the display fields.

/// A single feed entry, normalised from the watched feed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FeedItem {
    /// Platform-native identifier used for de-duplication.
    ///
    /// Namespaced ids (`yt:video:abc123`) are reduced to their final segment
    /// by [`normalize_id`] before they land here.
    pub id: String,

    /// Human-readable headline.
    pub title: String,

    /// Link to the item's public page.
    pub url: String,

    /// Preview image, when the feed provides one.
    ///
    /// Photo-based channels (Instagram, the Facebook photo flow) need this;
    /// text channels ignore it.
    pub thumbnail_url: Option<String>,
}

impl FeedItem {
    pub fn new(
        id: impl AsRef<str>,
        title: impl Into<String>,
        url: impl Into<String>,
        thumbnail_url: Option<String>,
    ) -> Self {
        Self {
            id: normalize_id(id.as_ref()),
            title: title.into(),
            url: url.into(),
            thumbnail_url,
        }
    }
}

/// Reduce a namespaced identifier to its final `:`-separated segment.
///
/// `"yt:video:abc123"` becomes `"abc123"`; an id without a separator is
/// returned trimmed but otherwise untouched.
pub fn normalize_id(raw: &str) -> String {
    raw.trim()
        .rsplit(':')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_namespace() {
        assert_eq!(normalize_id("yt:video:abc123"), "abc123");
    }

    #[test]
    fn normalize_keeps_plain_ids() {
        assert_eq!(normalize_id("abc123"), "abc123");
        assert_eq!(normalize_id("  abc123 \n"), "abc123");
    }

    #[test]
    fn normalize_trailing_separator_yields_empty() {
        // The caller treats an empty id as a malformed entry.
        assert_eq!(normalize_id("yt:video:"), "");
    }

    #[test]
    fn new_normalizes_id() {
        let item = FeedItem::new("yt:video:xyz789", "Title", "https://youtu.be/xyz789", None);
        assert_eq!(item.id, "xyz789");
        assert_eq!(item.title, "Title");
        assert!(item.thumbnail_url.is_none());
    }
}
