//! Facebook Page channel.
//!
//! With a thumbnail the item goes out as a single-step photo post
//! (`/{page_id}/photos`, the image fetched by Facebook from `url`); without
//! one it falls back to a link post on the page feed.  One attempt only.

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use super::{announcement, graph_post, ChannelError, ChannelPoster};
use crate::source::FeedItem;

pub struct FacebookChannel {
    http: Client,
    graph_base: String,
    page_id: Option<String>,
    access_token: Option<String>,
    headline: String,
}

impl FacebookChannel {
    pub fn new(
        http: Client,
        graph_base: impl Into<String>,
        page_id: Option<String>,
        access_token: Option<String>,
        headline: impl Into<String>,
    ) -> Self {
        Self {
            http,
            graph_base: graph_base.into(),
            page_id,
            access_token,
            headline: headline.into(),
        }
    }

    /// Endpoint and form fields for `item`, without the access token.
    fn build_request(&self, page_id: &str, item: &FeedItem) -> (String, Vec<(&'static str, String)>) {
        let message = announcement(&self.headline, item);
        match item.thumbnail_url.as_deref() {
            Some(thumbnail) => (
                format!("{}/{page_id}/photos", self.graph_base),
                vec![("url", thumbnail.to_string()), ("caption", message)],
            ),
            None => (
                format!("{}/{page_id}/feed", self.graph_base),
                vec![("message", message), ("link", item.url.clone())],
            ),
        }
    }
}

#[async_trait]
impl ChannelPoster for FacebookChannel {
    fn name(&self) -> &'static str {
        "facebook"
    }

    async fn post(&self, item: &FeedItem) -> Result<(), ChannelError> {
        let (Some(page_id), Some(token)) = (self.page_id.as_deref(), self.access_token.as_deref())
        else {
            return Err(ChannelError::NotConfigured(
                "FB_PAGE_ID / FB_PAGE_ACCESS_TOKEN are not set".into(),
            ));
        };

        let (endpoint, fields) = self.build_request(page_id, item);
        let mut form: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        form.push(("access_token", token));

        let response = graph_post(&self.http, &endpoint, &form).await?;
        let post_id = response
            .get("post_id")
            .or_else(|| response.get("id"))
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        info!(post_id, "Posted to Facebook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(page_id: Option<&str>, token: Option<&str>) -> FacebookChannel {
        FacebookChannel::new(
            Client::new(),
            "https://graph.facebook.com/v19.0",
            page_id.map(String::from),
            token.map(String::from),
            "New video!",
        )
    }

    #[test]
    fn thumbnail_makes_a_photo_post() {
        let item = FeedItem::new(
            "abc",
            "Title",
            "https://youtu.be/abc",
            Some("https://i.ytimg.com/vi/abc/hqdefault.jpg".into()),
        );
        let (endpoint, fields) = channel(Some("42"), Some("t")).build_request("42", &item);

        assert_eq!(endpoint, "https://graph.facebook.com/v19.0/42/photos");
        assert!(fields.contains(&("url", "https://i.ytimg.com/vi/abc/hqdefault.jpg".to_string())));
        assert!(fields
            .iter()
            .any(|(k, v)| *k == "caption" && v.contains("https://youtu.be/abc")));
    }

    #[test]
    fn no_thumbnail_makes_a_link_post() {
        let item = FeedItem::new("abc", "Title", "https://youtu.be/abc", None);
        let (endpoint, fields) = channel(Some("42"), Some("t")).build_request("42", &item);

        assert_eq!(endpoint, "https://graph.facebook.com/v19.0/42/feed");
        assert!(fields.contains(&("link", "https://youtu.be/abc".to_string())));
        assert!(fields.iter().any(|(k, v)| *k == "message" && v.starts_with("New video!")));
    }

    #[tokio::test]
    async fn missing_credentials_are_a_skip() {
        let item = FeedItem::new("abc", "Title", "https://youtu.be/abc", None);
        for ch in [channel(None, Some("t")), channel(Some("42"), None), channel(None, None)] {
            let err = ch.post(&item).await.unwrap_err();
            assert!(matches!(err, ChannelError::NotConfigured(_)));
        }
    }
}
