use std::time::Duration;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::time::{Instant, MissedTickBehavior};

/// Tick source that allows one query cycle per `period`.
///
/// The first tick fires immediately. Ticks missed while a cycle is running
/// are skipped rather than bursted.
pub fn interval_limiter(period: Duration) -> BoxStream<'static, Instant> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    stream::unfold(interval, |mut interval| async move {
        let tick = interval.tick().await;
        Some((tick, interval))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_period() {
        let started = Instant::now();
        let mut limiter = interval_limiter(Duration::from_millis(250));

        limiter.next().await;
        assert_eq!(started.elapsed(), Duration::ZERO);

        limiter.next().await;
        limiter.next().await;
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }
}
