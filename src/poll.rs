//! The polling loop.
//!
//! One iteration runs to completion before the next begins:
//!
//! ```text
//! fetch latest ──► compare with stored id ──► (new?) save id, dispatch
//!        │
//!        └──► heartbeat due? ──► silent admin message, mark, prune logs
//!                                         │
//!                        sleep poll interval ◄┘  (or stop on signal)
//! ```
//!
//! ## Failure containment
//!
//! Fetch failures and malformed feeds count as "no new item".  Anything that
//! still escapes an iteration (a panic in a collaborator) is caught by
//! [`Scheduler::run_iteration`], logged, reported to the admin chat, and the
//! loop carries on with the next sleep.  The loop itself only ends when the
//! shutdown future resolves, and that is only checked while sleeping.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::channels::AdminChannel;
use crate::dispatch::{panic_message, Dispatcher, NotificationOutcome};
use crate::logging::LogRetention;
use crate::source::FeedSource;
use crate::state::StateStore;

/// Cadences and housekeeping for the loop.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub heartbeat_interval_hours: u32,
    pub retention: LogRetention,
}

/// What the feed step of one iteration did.
#[derive(Debug)]
pub enum PollOutcome {
    /// Fetch failed or the feed had no usable entry.
    NoItem,
    /// No prior state: the item was recorded without announcing it.
    Baseline(String),
    /// The newest item is the one already processed.
    Unchanged,
    /// A new item was saved and dispatched.
    Announced {
        item_id: String,
        outcomes: Vec<NotificationOutcome>,
    },
}

impl PollOutcome {
    /// Short rendering for the per-iteration log line.
    pub fn summary(&self) -> String {
        match self {
            Self::NoItem => "no item".to_string(),
            Self::Baseline(id) => format!("baseline {id}"),
            Self::Unchanged => "unchanged".to_string(),
            Self::Announced { item_id, outcomes } => {
                let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
                format!("announced {item_id} ({delivered}/{} delivered)", outcomes.len())
            }
        }
    }
}

/// Summary of one completed iteration.
#[derive(Debug)]
pub struct TickReport {
    pub poll: PollOutcome,
    pub heartbeat_sent: bool,
}

pub struct Scheduler {
    source: Box<dyn FeedSource>,
    store: StateStore,
    dispatcher: Dispatcher,
    admin: Box<dyn AdminChannel>,
    settings: SchedulerSettings,
    /// Set once this process has a stored id to compare against.  An absent
    /// id afterwards means the state was lost, not that this is a first run.
    baseline_established: bool,
    last_item_id: Option<String>,
    polls: u64,
    started: Instant,
}

impl Scheduler {
    pub fn new(
        source: Box<dyn FeedSource>,
        store: StateStore,
        dispatcher: Dispatcher,
        admin: Box<dyn AdminChannel>,
        settings: SchedulerSettings,
    ) -> Self {
        let last_item_id = store.load_last_item_id();
        match &last_item_id {
            Some(id) => info!(item_id = %id, "resuming from stored state"),
            None => info!("no stored state, the first fetched item becomes the baseline"),
        }

        Self {
            source,
            store,
            dispatcher,
            admin,
            settings,
            baseline_established: last_item_id.is_some(),
            last_item_id,
            polls: 0,
            started: Instant::now(),
        }
    }

    /// Send a silent "started" note to the admin chat.
    pub async fn notify_startup(&self, feed_url: &str) {
        let text = format!(
            "\u{1f680} video-herald {} started\nWatching: {feed_url}\nChannels: {}",
            env!("CARGO_PKG_VERSION"),
            self.dispatcher.channel_names().join(", ")
        );
        self.send_admin_logged(&text, true, "startup notice").await;
    }

    /// Poll until `shutdown` resolves.
    pub async fn run<S>(mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            interval = ?self.settings.poll_interval,
            heartbeat_hours = self.settings.heartbeat_interval_hours,
            "polling loop started"
        );

        loop {
            if let Some(report) = self.run_iteration().await {
                debug!(
                    poll = %report.poll.summary(),
                    heartbeat = report.heartbeat_sent,
                    "iteration finished"
                );
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!(polls = self.polls, "shutdown requested, stopping polling loop");
                    break;
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// One iteration inside the failure boundary.
    ///
    /// Returns `None` when the iteration was abandoned.
    pub async fn run_iteration(&mut self) -> Option<TickReport> {
        match AssertUnwindSafe(self.tick()).catch_unwind().await {
            Ok(report) => Some(report),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(reason = %reason, polls = self.polls, "poll iteration panicked, continuing");
                let text = format!("\u{26a0}\u{fe0f} video-herald iteration failed: {reason}");
                if AssertUnwindSafe(self.send_admin_logged(&text, false, "alert"))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    error!("admin alert panicked as well");
                }
                None
            }
        }
    }

    /// One iteration: feed step, then heartbeat step.
    pub async fn tick(&mut self) -> TickReport {
        self.polls += 1;
        let poll = self.poll_feed().await;
        let heartbeat_sent = self.heartbeat_if_due().await;
        TickReport {
            poll,
            heartbeat_sent,
        }
    }

    async fn poll_feed(&mut self) -> PollOutcome {
        let item = match self.source.latest().await {
            Ok(Some(item)) => item,
            Ok(None) => {
                info!(source = self.source.name(), "feed has no usable entry");
                return PollOutcome::NoItem;
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(source = self.source.name(), error = %reason, "feed fetch failed, treating as no new item");
                return PollOutcome::NoItem;
            }
        };

        let stored = self.store.load_last_item_id();
        if stored.as_deref() == Some(item.id.as_str()) {
            debug!(item_id = %item.id, "no new item");
            self.baseline_established = true;
            self.last_item_id = stored;
            return PollOutcome::Unchanged;
        }

        if stored.is_none() && self.last_item_id.as_deref() == Some(item.id.as_str()) {
            warn!(item_id = %item.id, "stored state is unreadable, keeping the in-memory id and rewriting it");
            self.record(&item.id);
            return PollOutcome::Unchanged;
        }

        if stored.is_none() && !self.baseline_established {
            info!(item_id = %item.id, title = %item.title, "recording baseline, not announcing");
            self.record(&item.id);
            return PollOutcome::Baseline(item.id);
        }

        if stored.is_none() {
            warn!(item_id = %item.id, "stored state is gone, announcing the latest item again");
        }
        info!(item_id = %item.id, previous = ?stored, title = %item.title, "new item detected");

        self.record(&item.id);
        let outcomes = self.dispatcher.notify(&item).await;
        PollOutcome::Announced {
            item_id: item.id,
            outcomes,
        }
    }

    fn record(&mut self, item_id: &str) {
        self.store.save_last_item_id(item_id);
        self.baseline_established = true;
        self.last_item_id = Some(item_id.to_string());
    }

    async fn heartbeat_if_due(&mut self) -> bool {
        if !self
            .store
            .should_emit_heartbeat(self.settings.heartbeat_interval_hours)
        {
            return false;
        }

        let text = self.heartbeat_message();
        self.send_admin_logged(&text, true, "heartbeat").await;
        self.store.mark_heartbeat_emitted();

        let deleted = self.settings.retention.run().await;
        debug!(deleted, "log retention pass finished");
        true
    }

    fn heartbeat_message(&self) -> String {
        format!(
            "\u{2705} video-herald is alive\nUptime: {}\nPolls: {}\nLast item: {}",
            format_uptime(self.started.elapsed()),
            self.polls,
            self.last_item_id.as_deref().unwrap_or("none yet"),
        )
    }

    async fn send_admin_logged(&self, text: &str, silent: bool, what: &'static str) {
        match self.admin.send_admin(text, silent).await {
            Ok(()) => info!(message = what, "admin message sent"),
            Err(e) if e.is_skip() => warn!(message = what, reason = %e, "admin message skipped"),
            Err(e) => error!(message = what, error = %e, "admin message failed"),
        }
    }
}

/// `1d 2h 3m` style rendering, minutes resolution.
fn format_uptime(elapsed: Duration) -> String {
    let minutes = elapsed.as_secs() / 60;
    let (days, hours, minutes) = (minutes / 1440, (minutes / 60) % 24, minutes % 60);
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
