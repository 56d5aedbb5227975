//! Instagram channel (Graph API, business/creator accounts).
//!
//! Publishing is two calls: create a media container from an image URL and
//! caption, then publish the container.  Neither call is idempotent, so the
//! flow runs exactly once; a failure in either step fails the channel.
//! Links in captions are not clickable on Instagram, the URL is included for
//! reference only.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use super::{
    announcement, graph_post, truncate_message, ChannelError, ChannelPoster, INSTAGRAM_CAPTION_LIMIT,
};
use crate::source::FeedItem;

/// Pause between container creation and publish.
const DEFAULT_PUBLISH_DELAY: Duration = Duration::from_secs(2);

pub struct InstagramChannel {
    http: Client,
    graph_base: String,
    user_id: Option<String>,
    access_token: Option<String>,
    headline: String,
    publish_delay: Duration,
}

impl InstagramChannel {
    pub fn new(
        http: Client,
        graph_base: impl Into<String>,
        user_id: Option<String>,
        access_token: Option<String>,
        headline: impl Into<String>,
    ) -> Self {
        Self {
            http,
            graph_base: graph_base.into(),
            user_id,
            access_token,
            headline: headline.into(),
            publish_delay: DEFAULT_PUBLISH_DELAY,
        }
    }

    async fn create_container(
        &self,
        user_id: &str,
        token: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<String, ChannelError> {
        let url = format!("{}/{user_id}/media", self.graph_base);
        let response = graph_post(
            &self.http,
            &url,
            &[("image_url", image_url), ("caption", caption), ("access_token", token)],
        )
        .await?;

        creation_id(&response).ok_or_else(|| {
            ChannelError::Api(format!("media creation returned no id: {response}"))
        })
    }

    async fn publish_container(
        &self,
        user_id: &str,
        token: &str,
        creation_id: &str,
    ) -> Result<(), ChannelError> {
        let url = format!("{}/{user_id}/media_publish", self.graph_base);
        graph_post(
            &self.http,
            &url,
            &[("creation_id", creation_id), ("access_token", token)],
        )
        .await?;
        Ok(())
    }
}

fn creation_id(response: &serde_json::Value) -> Option<String> {
    response
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
        .map(String::from)
}

#[async_trait]
impl ChannelPoster for InstagramChannel {
    fn name(&self) -> &'static str {
        "instagram"
    }

    async fn post(&self, item: &FeedItem) -> Result<(), ChannelError> {
        let (Some(user_id), Some(token)) = (self.user_id.as_deref(), self.access_token.as_deref())
        else {
            return Err(ChannelError::NotConfigured(
                "IG_USER_ID / IG_ACCESS_TOKEN are not set".into(),
            ));
        };
        let Some(image_url) = item.thumbnail_url.as_deref() else {
            return Err(ChannelError::Unsupported(
                "item has no thumbnail, Instagram needs an image".into(),
            ));
        };

        let caption = truncate_message(&announcement(&self.headline, item), INSTAGRAM_CAPTION_LIMIT);
        let creation_id = self
            .create_container(user_id, token, image_url, &caption)
            .await?;
        debug!(creation_id = %creation_id, "Instagram media container created");

        tokio::time::sleep(self.publish_delay).await;

        self.publish_container(user_id, token, &creation_id).await?;
        info!(creation_id = %creation_id, "Posted to Instagram");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel(user_id: Option<&str>, token: Option<&str>) -> InstagramChannel {
        InstagramChannel::new(
            Client::new(),
            "https://graph.facebook.com/v19.0",
            user_id.map(String::from),
            token.map(String::from),
            "New video!",
        )
    }

    #[test]
    fn creation_id_reads_the_id_field() {
        assert_eq!(creation_id(&json!({"id": "1789"})).as_deref(), Some("1789"));
        assert_eq!(creation_id(&json!({"id": ""})), None);
        assert_eq!(creation_id(&json!({})), None);
    }

    #[tokio::test]
    async fn missing_credentials_are_a_skip() {
        let item = FeedItem::new("abc", "t", "https://youtu.be/abc", Some("https://img".into()));
        let err = channel(None, None).post(&item).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn missing_thumbnail_is_a_skip() {
        let item = FeedItem::new("abc", "t", "https://youtu.be/abc", None);
        let err = channel(Some("1"), Some("t")).post(&item).await.unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(_)));
    }
}
