use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use cwtail_types::{BackendError, FilterQuery, LogBackend, LogEvent};

use crate::error::TailError;
use crate::gate::ReadinessGate;
use crate::resolver::StreamSet;
use crate::retry::{Retry, THROTTLE_RETRY_DELAY};
use crate::sieve::EventSieve;

/// Poller lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerState {
    /// Waiting for the next limiter tick
    Idle,
    /// A paginated query is in flight
    Querying,
    /// Terminal: pagination finished without following, a fatal error
    /// occurred, or the tail was cancelled
    Done,
}

/// Build the query window for the next cycle.
///
/// An end time only applies when not following; following is always open ended.
pub fn query_window(
    group: &str,
    high_water: i64,
    streams: Vec<String>,
    end_time: Option<i64>,
    follow: bool,
    include: Option<&str>,
) -> FilterQuery {
    FilterQuery::new(group, high_water)
        .with_streams(streams)
        .with_end_time(if follow { None } else { end_time })
        .with_filter_pattern(include)
}

/// How a query cycle ended
enum Cycle {
    /// All pages consumed
    Exhausted,
    /// Cancelled, or the consumer went away
    Stopped,
    Failed(TailError),
}

/// Limiter-driven query loop
pub(crate) struct Poller<B: ?Sized, L> {
    pub(crate) backend: Arc<B>,
    pub(crate) group: String,
    pub(crate) follow: bool,
    pub(crate) end_time: Option<i64>,
    pub(crate) include: Option<String>,
    pub(crate) streams: Arc<StreamSet>,
    pub(crate) gate: Arc<ReadinessGate>,
    pub(crate) sieve: EventSieve,
    pub(crate) limiter: L,
    pub(crate) output: mpsc::Sender<Result<LogEvent, TailError>>,
    pub(crate) state: watch::Sender<PollerState>,
    pub(crate) cancel: CancellationToken,
}

impl<B, L> Poller<B, L>
where
    B: LogBackend + ?Sized + 'static,
    L: Stream + Unpin + Send + 'static,
{
    /// Poll until done, cancelled, or the limiter ends.
    /// On return the shared token is cancelled and the output channel closes.
    pub(crate) async fn run(mut self) {
        loop {
            let ticked = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                tick = self.limiter.next() => tick.is_some(),
            };
            if !ticked {
                break;
            }

            if !self.gate.try_acquire() {
                tracing::debug!("{} still tailing, skip polling", self.group);
                continue;
            }

            self.state.send_replace(PollerState::Querying);

            match self.query_cycle().await {
                Cycle::Exhausted => {}
                Cycle::Stopped => break,
                Cycle::Failed(e) => {
                    tracing::error!(error = %e, "tail stopped");
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {}
                        _ = self.output.send(Err(e)) => {}
                    }
                    break;
                }
            }

            if !self.follow {
                tracing::debug!(high_water = self.sieve.high_water(), "pagination exhausted");
                break;
            }

            tracing::trace!("last page");
            self.state.send_replace(PollerState::Idle);
            self.gate.signal();
        }

        self.state.send_replace(PollerState::Done);
        // Refresh and purge only serve the poller
        self.cancel.cancel();
    }

    fn next_window(&self) -> FilterQuery {
        query_window(
            &self.group,
            self.sieve.high_water(),
            self.streams.snapshot(),
            self.end_time,
            self.follow,
            self.include.as_deref(),
        )
    }

    async fn query_cycle(&mut self) -> Cycle {
        let query = self.next_window();
        tracing::debug!(
            start = query.start_time,
            end = ?query.end_time,
            streams = query.stream_names.len(),
            "querying"
        );

        let retry = Retry::bounded(THROTTLE_RETRY_DELAY, 1);
        let mut next_token: Option<String> = None;

        loop {
            let backend = &self.backend;
            let fetched = retry
                .run(&self.cancel, BackendError::is_throttled, || {
                    backend.filter_events(&query, next_token.clone())
                })
                .await;

            let page = match fetched {
                None => return Cycle::Stopped,
                Some(Ok(page)) => page,
                Some(Err(e)) => return Cycle::Failed(TailError::from_query(&self.group, e)),
            };

            for event in page.events {
                if !self.sieve.admit(&event).is_emitted() {
                    continue;
                }

                let sent = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Cycle::Stopped,
                    sent = self.output.send(Ok(event)) => sent,
                };
                if sent.is_err() {
                    return Cycle::Stopped;
                }
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Cycle::Exhausted,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_follow_is_open_ended() {
        let query = query_window("g", 100, Vec::new(), Some(500), true, None);
        assert_eq!(query.start_time, 100);
        assert_eq!(query.end_time, None);
    }

    #[test]
    fn test_window_bounded_when_not_following() {
        let query = query_window("g", 100, vec!["a".into()], Some(500), false, Some("ERROR"));
        assert_eq!(query.end_time, Some(500));
        assert_eq!(query.stream_names, vec!["a".to_string()]);
        assert_eq!(query.filter_pattern.as_deref(), Some("ERROR"));
    }

    #[test]
    fn test_window_without_end_time() {
        let query = query_window("g", 100, Vec::new(), None, false, Some(""));
        assert_eq!(query.end_time, None);
        assert_eq!(query.filter_pattern, None);
        assert!(query.stream_names.is_empty());
    }
}
