use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::warn;
use retry::delay::jitter;

/// Bounded exponential backoff: `retries` extra attempts, doubling from `base_delay`.
#[derive(Clone, Debug)]
pub struct Backoff {
    pub retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    pub fn new(retries: usize, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.retries).map(move |n| {
            let factor = 1u32.checked_shl(n.min(16) as u32).unwrap_or(u32::MAX);
            let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
            // Keep at least half the delay so retries stay spaced out.
            delay / 2 + jitter(delay / 2)
        })
    }
}

/// Runs `op` until it succeeds, the error is not retryable, or the retries run out.
/// `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    backoff: &Backoff,
    label: &str,
    is_retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let mut delays = backoff.delays();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_retryable(&err) {
            return Err(err);
        }

        match delays.next() {
            Some(delay) => {
                warn!(
                    "{} failed on attempt {}: {}. Retrying in {:?}",
                    label, attempt, err, delay
                );
                tokio::time::sleep(delay).await;
            }
            None => return Err(err),
        }
    }
}
