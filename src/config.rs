//! Daemon configuration, read once at startup from the environment.
//!
//! A `.env` file in the working directory is honoured.  Every channel's
//! credentials are optional: an incomplete set leaves the channel
//! unconfigured and it is skipped at dispatch time.  The feed URL is the only
//! value without a default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::channels::RetryPolicy;
use crate::logging::LogRotation;
use crate::source::channel_feed_url;

/// Telegram bot credentials and targets.
#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    pub token: Option<String>,
    /// Public chat the announcements go to (e.g. `@channel`).
    pub public_chat_id: Option<String>,
    /// Operator chat for heartbeats and alerts.
    pub admin_chat_id: Option<String>,
}

/// Facebook Page credentials.
#[derive(Debug, Clone, Default)]
pub struct FacebookConfig {
    pub page_id: Option<String>,
    pub access_token: Option<String>,
}

/// Instagram business account credentials.
#[derive(Debug, Clone, Default)]
pub struct InstagramConfig {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub feed_url: String,
    pub telegram: TelegramConfig,
    pub facebook: FacebookConfig,
    pub instagram: InstagramConfig,
    pub graph_api_version: String,
    pub headline: String,
    pub poll_interval: Duration,
    pub heartbeat_interval_hours: u32,
    pub log_dir: PathBuf,
    pub log_file_prefix: String,
    pub log_retention_days: u32,
    pub log_rotation: LogRotation,
    pub state_file: PathBuf,
    pub heartbeat_file: PathBuf,
    pub http_timeout: Duration,
    pub send_retry: RetryPolicy,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    ///
    /// `feed_override` (the first command-line argument) replaces
    /// `YOUTUBE_FEED_URL` and satisfies the feed requirement on its own.
    pub fn from_env(feed_override: Option<String>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(with_feed_override(
            |key| std::env::var(key).ok(),
            feed_override,
        ))
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let feed_url = match (get("YOUTUBE_FEED_URL"), get("YOUTUBE_CHANNEL_ID")) {
            (Some(url), _) => url,
            (None, Some(channel_id)) => channel_feed_url(&channel_id),
            (None, None) => bail!("either YOUTUBE_FEED_URL or YOUTUBE_CHANNEL_ID must be set"),
        };

        let poll_secs: u64 = parse_or(&get, "CHECK_INTERVAL_SECONDS", 1800)?;
        let heartbeat_interval_hours: u32 = parse_or(&get, "HEARTBEAT_INTERVAL_HOURS", 24)?;
        let log_retention_days: u32 = parse_or(&get, "LOG_RETENTION_DAYS", 7)?;
        let log_max_bytes: u64 = parse_or(&get, "LOG_MAX_BYTES", 5 * 1024 * 1024)?;
        let log_max_files: usize = parse_or(&get, "LOG_MAX_FILES", 5)?;
        let timeout_secs: u64 = parse_or(&get, "HTTP_TIMEOUT_SECONDS", 15)?;
        let retry_attempts: u32 = parse_or(&get, "SEND_RETRY_ATTEMPTS", 3)?;
        let retry_delay_secs: u64 = parse_or(&get, "SEND_RETRY_DELAY_SECONDS", 3)?;

        for (key, value) in [
            ("CHECK_INTERVAL_SECONDS", poll_secs),
            ("HEARTBEAT_INTERVAL_HOURS", u64::from(heartbeat_interval_hours)),
            ("HTTP_TIMEOUT_SECONDS", timeout_secs),
            ("SEND_RETRY_ATTEMPTS", u64::from(retry_attempts)),
            ("LOG_MAX_BYTES", log_max_bytes),
        ] {
            if value == 0 {
                bail!("{key} must be greater than zero");
            }
        }

        Ok(Self {
            feed_url,
            telegram: TelegramConfig {
                token: get("TELEGRAM_TOKEN"),
                public_chat_id: get("TELEGRAM_PUBLIC_CHAT_ID"),
                admin_chat_id: get("ADMIN_CHAT_ID"),
            },
            facebook: FacebookConfig {
                page_id: get("FB_PAGE_ID"),
                access_token: get("FB_PAGE_ACCESS_TOKEN"),
            },
            instagram: InstagramConfig {
                user_id: get("IG_USER_ID"),
                access_token: get("IG_ACCESS_TOKEN"),
            },
            graph_api_version: get("GRAPH_API_VERSION").unwrap_or_else(|| "v19.0".to_string()),
            headline: get("ANNOUNCE_HEADLINE").unwrap_or_else(|| "New YouTube video!".to_string()),
            poll_interval: Duration::from_secs(poll_secs),
            heartbeat_interval_hours,
            log_dir: get("LOG_DIR").unwrap_or_else(|| "logs".to_string()).into(),
            log_file_prefix: get("LOG_FILE_PREFIX")
                .unwrap_or_else(|| "video-herald.log".to_string()),
            log_retention_days,
            log_rotation: LogRotation {
                max_bytes: log_max_bytes,
                max_files: log_max_files,
            },
            state_file: get("LAST_VIDEO_FILE")
                .unwrap_or_else(|| "last_video.json".to_string())
                .into(),
            heartbeat_file: get("LAST_HEARTBEAT_FILE")
                .unwrap_or_else(|| "last_heartbeat.txt".to_string())
                .into(),
            http_timeout: Duration::from_secs(timeout_secs),
            send_retry: RetryPolicy::new(retry_attempts, Duration::from_secs(retry_delay_secs)),
        })
    }

    /// Base URL for Graph API calls (Facebook and Instagram).
    pub fn graph_base(&self) -> String {
        format!("https://graph.facebook.com/{}", self.graph_api_version)
    }

    /// Channel names that have complete credentials, for the startup log.
    pub fn configured_channels(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.telegram.token.is_some() && self.telegram.public_chat_id.is_some() {
            out.push("telegram");
        }
        if self.facebook.page_id.is_some() && self.facebook.access_token.is_some() {
            out.push("facebook");
        }
        if self.instagram.user_id.is_some() && self.instagram.access_token.is_some() {
            out.push("instagram");
        }
        out
    }
}

fn with_feed_override<F>(lookup: F, feed: Option<String>) -> impl Fn(&str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    move |key: &str| match (&feed, key) {
        (Some(url), "YOUTUBE_FEED_URL") => Some(url.clone()),
        _ => lookup(key),
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("YOUTUBE_FEED_URL", "https://example.com/feed.xml")]).unwrap();

        assert_eq!(cfg.feed_url, "https://example.com/feed.xml");
        assert_eq!(cfg.poll_interval, Duration::from_secs(1800));
        assert_eq!(cfg.heartbeat_interval_hours, 24);
        assert_eq!(cfg.log_retention_days, 7);
        assert_eq!(cfg.log_rotation.max_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.log_rotation.max_files, 5);
        assert_eq!(cfg.state_file, PathBuf::from("last_video.json"));
        assert_eq!(cfg.heartbeat_file, PathBuf::from("last_heartbeat.txt"));
        assert_eq!(cfg.http_timeout, Duration::from_secs(15));
        assert_eq!(cfg.send_retry, RetryPolicy::default());
        assert_eq!(cfg.graph_base(), "https://graph.facebook.com/v19.0");
        assert!(cfg.configured_channels().is_empty());
    }

    #[test]
    fn channel_id_builds_feed_url() {
        let cfg = config(&[("YOUTUBE_CHANNEL_ID", "UC123")]).unwrap();
        assert_eq!(
            cfg.feed_url,
            "https://www.youtube.com/feeds/videos.xml?channel_id=UC123"
        );
    }

    #[test]
    fn explicit_feed_url_wins_over_channel_id() {
        let cfg = config(&[
            ("YOUTUBE_CHANNEL_ID", "UC123"),
            ("YOUTUBE_FEED_URL", "https://example.com/feed.xml"),
        ])
        .unwrap();
        assert_eq!(cfg.feed_url, "https://example.com/feed.xml");
    }

    #[test]
    fn missing_feed_is_an_error() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("YOUTUBE_FEED_URL"));
    }

    #[test]
    fn command_line_feed_is_enough_on_its_own() {
        let lookup = with_feed_override(|_| None, Some("https://example.com/cli.xml".into()));
        let cfg = Config::from_lookup(lookup).unwrap();
        assert_eq!(cfg.feed_url, "https://example.com/cli.xml");
    }

    #[test]
    fn command_line_feed_wins_over_environment() {
        let lookup = with_feed_override(
            |key| match key {
                "YOUTUBE_FEED_URL" => Some("https://example.com/env.xml".to_string()),
                "CHECK_INTERVAL_SECONDS" => Some("60".to_string()),
                _ => None,
            },
            Some("https://example.com/cli.xml".into()),
        );
        let cfg = Config::from_lookup(lookup).unwrap();
        assert_eq!(cfg.feed_url, "https://example.com/cli.xml");
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn bad_number_is_an_error() {
        let err = config(&[
            ("YOUTUBE_CHANNEL_ID", "UC123"),
            ("CHECK_INTERVAL_SECONDS", "half an hour"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("CHECK_INTERVAL_SECONDS"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = config(&[("YOUTUBE_CHANNEL_ID", "UC123"), ("CHECK_INTERVAL_SECONDS", "0")])
            .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let cfg = config(&[
            ("YOUTUBE_CHANNEL_ID", "UC123"),
            ("TELEGRAM_TOKEN", "  "),
            ("TELEGRAM_PUBLIC_CHAT_ID", "@chan"),
        ])
        .unwrap();
        assert!(cfg.telegram.token.is_none());
        assert!(cfg.configured_channels().is_empty());
    }

    #[test]
    fn complete_credentials_enable_channels() {
        let cfg = config(&[
            ("YOUTUBE_CHANNEL_ID", "UC123"),
            ("TELEGRAM_TOKEN", "123:ABC"),
            ("TELEGRAM_PUBLIC_CHAT_ID", "@chan"),
            ("ADMIN_CHAT_ID", "42"),
            ("FB_PAGE_ID", "1"),
            ("FB_PAGE_ACCESS_TOKEN", "fb"),
            ("IG_USER_ID", "2"),
        ])
        .unwrap();
        assert_eq!(cfg.configured_channels(), vec!["telegram", "facebook"]);
        assert_eq!(cfg.telegram.admin_chat_id.as_deref(), Some("42"));
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("YOUTUBE_CHANNEL_ID", "UC123"),
            ("CHECK_INTERVAL_SECONDS", "60"),
            ("SEND_RETRY_ATTEMPTS", "5"),
            ("SEND_RETRY_DELAY_SECONDS", "1"),
            ("LOG_DIR", "/var/log/herald"),
            ("ANNOUNCE_HEADLINE", "Нове YouTube відео!"),
        ])
        .unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.send_retry, RetryPolicy::new(5, Duration::from_secs(1)));
        assert_eq!(cfg.log_dir, PathBuf::from("/var/log/herald"));
        assert_eq!(cfg.headline, "Нове YouTube відео!");
    }
}
