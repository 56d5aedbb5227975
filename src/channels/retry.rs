//! Bounded retry for the messaging channels.
//!
//! A call is attempted up to [`RetryPolicy::attempts`] times with a fixed
//! pause between attempts.  A rate-limit answer replaces the pause with the
//! server-provided wait (capped).  Skips are never retried, and the final
//! failure is logged and handed back instead of escalating.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use super::ChannelError;

/// Upper bound on a server-requested rate-limit wait.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    fn wait_after(&self, err: &ChannelError) -> Duration {
        match err {
            ChannelError::RateLimited {
                retry_after: Some(wait),
            } => (*wait).min(MAX_RATE_LIMIT_WAIT),
            _ => self.delay,
        }
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the 1-based attempt number.  `label` names the call in log
/// lines.
pub async fn send_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, ChannelError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ChannelError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(call = label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_skip() => return Err(e),
            Err(e) if attempt >= attempts => {
                error!(call = label, attempts, error = %e, "giving up");
                return Err(e);
            }
            Err(e) => {
                let wait = policy.wait_after(&e);
                warn!(
                    call = label,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "attempt failed, retrying in {:?}",
                    wait
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}
