use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use cwtail_types::{BackendError, LogBackend, MAX_QUERY_STREAMS, StreamPattern};

use crate::retry::{DISCOVERY_RETRY_DELAY, Retry};

/// Default cadence of the background stream-list refresh
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// How long a listing may stall between two stream names
pub const LIST_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// The stream names currently being tailed (empty = whole group)
#[derive(Debug, Default)]
pub struct StreamSet {
    streams: Mutex<Vec<String>>,
}

impl StreamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set
    pub fn reset(&self, streams: Vec<String>) {
        *self.streams.lock() = streams;
    }

    /// Copy of the current set
    pub fn snapshot(&self) -> Vec<String> {
        self.streams.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.lock().is_empty()
    }
}

/// Keep the last `max` names. Listings are ordered oldest first, so this
/// keeps the most recently created streams.
pub fn truncate_to_recent(mut streams: Vec<String>, max: usize) -> Vec<String> {
    if streams.len() > max {
        let excess = streams.len() - max;
        streams.drain(..excess);
    }
    streams
}

/// Errors worth waiting out while the log group is being created
fn is_discovery_retryable(error: &BackendError) -> bool {
    error.is_not_found() || matches!(error, BackendError::Timeout(_))
}

/// Resolves a stream pattern to concrete stream names
pub struct StreamResolver<B: ?Sized> {
    backend: Arc<B>,
    group: String,
    pattern: StreamPattern,
    max_streams: usize,
}

impl<B: LogBackend + ?Sized + 'static> StreamResolver<B> {
    pub fn new(backend: Arc<B>, group: impl Into<String>, pattern: StreamPattern) -> Self {
        Self {
            backend,
            group: group.into(),
            pattern,
            max_streams: MAX_QUERY_STREAMS,
        }
    }

    /// Override the per-query stream limit
    pub fn with_max_streams(mut self, max_streams: usize) -> Self {
        self.max_streams = max_streams;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// List matching streams once.
    ///
    /// A listing that stalls for longer than [`LIST_IDLE_TIMEOUT`] fails with
    /// [`BackendError::Timeout`]; a listing that matches nothing fails with
    /// [`BackendError::NoStreams`]. Without retry, a tail whose pattern
    /// matches no stream therefore fails at startup instead of falling back
    /// to the whole group.
    pub async fn resolve(&self) -> Result<Vec<String>, BackendError> {
        let mut listing = self.backend.list_streams(&self.group, &self.pattern);
        let mut streams = Vec::new();

        loop {
            match tokio::time::timeout(LIST_IDLE_TIMEOUT, listing.next()).await {
                Ok(Some(Ok(name))) => streams.push(name),
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        group = %self.group,
                        found = streams.len(),
                        "stream listing stalled"
                    );
                    return Err(BackendError::Timeout(LIST_IDLE_TIMEOUT));
                }
            }
        }

        if streams.is_empty() {
            return Err(BackendError::NoStreams {
                group: self.group.clone(),
                pattern: self.pattern.to_string(),
            });
        }

        if streams.len() > self.max_streams {
            tracing::debug!(
                found = streams.len(),
                kept = self.max_streams,
                "too many streams, keeping the most recent"
            );
        }
        Ok(truncate_to_recent(streams, self.max_streams))
    }

    /// Resolve, waiting out a missing log group with a fixed delay.
    ///
    /// Returns None if cancelled first.
    pub async fn resolve_with_retry(
        &self,
        cancel: &CancellationToken,
    ) -> Option<Result<Vec<String>, BackendError>> {
        Retry::forever(DISCOVERY_RETRY_DELAY)
            .run(cancel, is_discovery_retryable, || self.resolve())
            .await
    }

    /// Whether a failed first resolution may be retried in the background
    pub fn is_retryable(&self, error: &BackendError) -> bool {
        is_discovery_retryable(error)
    }

    /// Re-resolve every `every` and overwrite `streams` on success.
    ///
    /// Failures and empty listings keep the previous set.
    pub async fn refresh_loop(
        &self,
        streams: &StreamSet,
        every: Duration,
        cancel: &CancellationToken,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.resolve() => result,
            };

            match result {
                Ok(found) => {
                    if found.len() != streams.len() {
                        tracing::debug!(group = %self.group, count = found.len(), "stream set changed");
                    }
                    streams.reset(found);
                }
                Err(e) => {
                    tracing::debug!(group = %self.group, error = %e, "stream refresh failed");
                }
            }
        }
    }

    /// Run [`refresh_loop`](Self::refresh_loop) on a background task
    pub fn spawn_refresh(
        self: Arc<Self>,
        streams: Arc<StreamSet>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(
            async move { self.refresh_loop(&streams, every, &cancel).await }.in_current_span(),
        )
    }
}
