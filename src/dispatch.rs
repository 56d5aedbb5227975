//! Fan-out of one new item to every configured channel.
//!
//! Channels run one after another in a fixed order (primary messaging
//! channel first, then the social platforms).  Each call goes through
//! [`isolate`], so an error or a panic in one channel is logged with the
//! channel's name and the remaining channels are still attempted.  The
//! dispatcher never touches persisted state.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::channels::{ChannelError, ChannelPoster};
use crate::source::FeedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    /// Channel not configured, or the item lacks what it needs.
    Skipped,
    Failed,
}

/// Per-channel result of one dispatch.  Only logged, never persisted.
#[derive(Debug, Clone)]
pub struct NotificationOutcome {
    pub channel: &'static str,
    pub status: DeliveryStatus,
    pub error: Option<String>,
}

impl NotificationOutcome {
    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }
}

pub struct Dispatcher {
    channels: Vec<Box<dyn ChannelPoster>>,
}

impl Dispatcher {
    /// `channels` are attempted in the order given.
    pub fn new(channels: Vec<Box<dyn ChannelPoster>>) -> Self {
        Self { channels }
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Publish `item` on every channel and report what happened on each.
    pub async fn notify(&self, item: &FeedItem) -> Vec<NotificationOutcome> {
        let mut outcomes = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            outcomes.push(isolate(channel.as_ref(), item).await);
        }

        let count = |status: DeliveryStatus| outcomes.iter().filter(|o| o.status == status).count();
        info!(
            item_id = %item.id,
            delivered = count(DeliveryStatus::Delivered),
            skipped = count(DeliveryStatus::Skipped),
            failed = count(DeliveryStatus::Failed),
            "dispatch finished"
        );
        outcomes
    }
}

/// Run one channel post with failure containment.
///
/// Errors and panics are logged with the channel's identity and folded into
/// the returned outcome; nothing propagates to the caller.
pub async fn isolate(channel: &dyn ChannelPoster, item: &FeedItem) -> NotificationOutcome {
    let name = channel.name();
    let result = match AssertUnwindSafe(channel.post(item)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ChannelError::Panicked(panic_message(payload.as_ref()))),
    };

    match result {
        Ok(()) => {
            info!(channel = name, item_id = %item.id, "notification delivered");
            NotificationOutcome {
                channel: name,
                status: DeliveryStatus::Delivered,
                error: None,
            }
        }
        Err(e) if e.is_skip() => {
            warn!(channel = name, reason = %e, "channel skipped");
            NotificationOutcome {
                channel: name,
                status: DeliveryStatus::Skipped,
                error: Some(e.to_string()),
            }
        }
        Err(e) => {
            error!(channel = name, item_id = %item.id, error = %e, "notification failed");
            NotificationOutcome {
                channel: name,
                status: DeliveryStatus::Failed,
                error: Some(e.to_string()),
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
