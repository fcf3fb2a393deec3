//! Bounded polling for server-side unpacking.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::ApiError;
use crate::client::ResourceState;

/// Timing and budget for the readiness poll.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    /// Wait before the first poll; unpacking never finishes instantly.
    pub initial_delay: Duration,
    /// Wait between polls.
    pub interval: Duration,
    /// Poll budget before giving up with [`ApiError::ReadyTimeout`].
    pub max_retries: u32,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(10),
            max_retries: 60,
        }
    }
}

/// Polls `fetch` until it reports a ready state.
///
/// `on_retry` receives the retry counter (1-based) after every unready
/// poll. A timeout is distinct from every other failure: the transfer
/// itself already succeeded, only post-processing is still pending.
/// Fetch errors propagate untouched.
pub async fn await_ready<F, Fut>(
    mut fetch: F,
    schedule: &PollSchedule,
    mut on_retry: impl FnMut(u32),
) -> Result<(), ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ResourceState, ApiError>>,
{
    tokio::time::sleep(schedule.initial_delay).await;

    let mut retries = 0;
    while retries < schedule.max_retries {
        let state = fetch().await?;
        debug!(?state, retries, "polled resource state");
        if state.is_ready() {
            return Ok(());
        }
        retries += 1;
        on_retry(retries);
        tokio::time::sleep(schedule.interval).await;
    }

    Err(ApiError::ReadyTimeout { retries })
}
