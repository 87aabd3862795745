//! Bounded poll-until-predicate.
//!
//! Every wait in a scenario is the same shape: evaluate a check right away,
//! then again on a fixed interval, until it reports satisfied or the deadline
//! passes. There is no backoff and no cancellation besides the deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Interval and overall budget of one wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSpec {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Poll `check` until it returns `true` or `spec.timeout` elapses.
///
/// `what` describes the awaited condition and ends up in the
/// [`AppError::Timeout`] returned on expiry.
pub async fn eventually<F, Fut>(what: &str, spec: PollSpec, mut check: F) -> AppResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + spec.timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        metrics::increment_counter!("mhc_e2e_poll_attempts_total", "what" => what.to_string());

        if check().await {
            debug!(what, attempt, "condition satisfied");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(AppError::timeout(what, spec.timeout));
        }

        debug!(what, attempt, "condition not yet satisfied");
        tokio::time::sleep(spec.interval.min(deadline - now)).await;
    }
}
