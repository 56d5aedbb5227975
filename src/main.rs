//! video-herald — announces new YouTube uploads on Telegram, Facebook and
//! Instagram.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌───────────┐ latest() ┌──────────┐ notify() ┌─────────────┐  post()  ┌────────────┐
//! │ source/   │ ───────► │ poll.rs  │ ───────► │ dispatch.rs │ ───────► │ channels/  │
//! │ (feed)    │          │ (loop)   │          │ (fan-out)   │          │ (HTTP)     │
//! └───────────┘          └──────────┘          └─────────────┘          └────────────┘
//!                          │      │ heartbeat / alerts ──► channels::AdminChannel
//!                          ▼      └─ log retention ─────► logging.rs
//!                       state.rs
//! ```
//!
//! * **`source/`** — the `FeedSource` trait and the YouTube Atom feed reader.
//! * **`state`** — last announced item id and last heartbeat, on disk.
//! * **`channels/`** — one `ChannelPoster` per platform plus the admin chat.
//! * **`dispatch`** — runs every channel with per-channel failure isolation.
//! * **`poll`** — the loop: fetch, dedup, dispatch, heartbeat, sleep.
//! * **`config`** / **`logging`** — startup plumbing.
//! * **`main`** — wires everything together and waits for a stop signal.

mod channels;
mod config;
mod dispatch;
mod logging;
mod poll;
mod source;
mod state;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use channels::{
    ChannelPoster, FacebookChannel, InstagramChannel, TelegramAdmin, TelegramChannel,
    TelegramClient,
};
use config::Config;
use dispatch::Dispatcher;
use logging::LogRetention;
use poll::{Scheduler, SchedulerSettings};
use source::YoutubeFeed;
use state::StateStore;

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // -- configuration -------------------------------------------------------
    let config = Config::from_env(std::env::args().nth(1))?;

    // Keep the guard alive for the whole process or file logs are dropped.
    let _log_guard = logging::init_logging(
        &config.log_dir,
        &config.log_file_prefix,
        config.log_rotation,
    )?;
    info!(
        feed = %config.feed_url,
        channels = ?config.configured_channels(),
        "video-herald starting"
    );

    // -- collaborators -------------------------------------------------------
    let http = reqwest::Client::builder()
        .user_agent(concat!("video-herald/", env!("CARGO_PKG_VERSION")))
        .timeout(config.http_timeout)
        .connect_timeout(Duration::from_secs(10).min(config.http_timeout))
        .build()
        .context("failed to build HTTP client")?;

    let telegram = TelegramClient::new(
        http.clone(),
        config.telegram.token.clone(),
        config.send_retry,
    );

    // Fixed order: primary messaging channel first, then social platforms.
    let channels: Vec<Box<dyn ChannelPoster>> = vec![
        Box::new(TelegramChannel::new(
            telegram.clone(),
            config.telegram.public_chat_id.clone(),
            config.headline.clone(),
        )),
        Box::new(FacebookChannel::new(
            http.clone(),
            config.graph_base(),
            config.facebook.page_id.clone(),
            config.facebook.access_token.clone(),
            config.headline.clone(),
        )),
        Box::new(InstagramChannel::new(
            http.clone(),
            config.graph_base(),
            config.instagram.user_id.clone(),
            config.instagram.access_token.clone(),
            config.headline.clone(),
        )),
    ];

    let scheduler = Scheduler::new(
        Box::new(YoutubeFeed::new(http, config.feed_url.clone())),
        StateStore::new(config.state_file.clone(), config.heartbeat_file.clone()),
        Dispatcher::new(channels),
        Box::new(TelegramAdmin::new(
            telegram,
            config.telegram.admin_chat_id.clone(),
        )),
        SchedulerSettings {
            poll_interval: config.poll_interval,
            heartbeat_interval_hours: config.heartbeat_interval_hours,
            retention: LogRetention {
                dir: config.log_dir.clone(),
                prefix: config.log_file_prefix.clone(),
                days: config.log_retention_days,
            },
        },
    );

    // -- main loop -----------------------------------------------------------
    scheduler.notify_startup(&config.feed_url).await;
    scheduler.run(shutdown_signal()).await;

    info!("video-herald stopped");
    Ok(())
}
