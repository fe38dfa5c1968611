use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Delay between attempts to find a log group that does not exist yet
pub const DISCOVERY_RETRY_DELAY: Duration = Duration::from_millis(150);

/// Delay before re-fetching a throttled page
pub const THROTTLE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Fixed-delay retry policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Retry {
    delay: Duration,
    /// Maximum number of retries after the first attempt (None = unbounded)
    max_retries: Option<u32>,
}

impl Retry {
    /// Retry forever with a fixed delay
    pub const fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_retries: None,
        }
    }

    /// Retry at most `max_retries` times with a fixed delay
    pub const fn bounded(delay: Duration, max_retries: u32) -> Self {
        Self {
            delay,
            max_retries: Some(max_retries),
        }
    }

    /// Run `op` until it succeeds, fails with an error `should_retry` rejects,
    /// or the retry budget is spent.
    ///
    /// Returns None if `cancel` fires while an attempt or a delay is pending.
    pub async fn run<T, E, Op, Fut, P>(
        &self,
        cancel: &CancellationToken,
        should_retry: P,
        mut op: Op,
    ) -> Option<Result<T, E>>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut retries = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                result = op() => result,
            };

            match result {
                Err(e) if should_retry(&e) && self.max_retries.is_none_or(|max| retries < max) => {
                    retries += 1;
                    tracing::warn!(
                        retry = retries,
                        delay_ms = self.delay.as_millis() as u64,
                        "{}, retrying",
                        e
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return None,
                        _ = tokio::time::sleep(self.delay) => {}
                    }
                }
                other => return Some(other),
            }
        }
    }
}
