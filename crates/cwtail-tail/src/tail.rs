use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use cwtail_types::{LogBackend, LogEvent, MAX_QUERY_STREAMS, StreamPattern};

use crate::cache::{DEFAULT_CACHE_TTL, DEFAULT_PURGE_INTERVAL, DedupCache};
use crate::error::TailError;
use crate::filter::CompiledFilter;
use crate::gate::ReadinessGate;
use crate::poller::{Poller, PollerState};
use crate::resolver::{DEFAULT_REFRESH_INTERVAL, StreamResolver, StreamSet};
use crate::retry::DISCOVERY_RETRY_DELAY;
use crate::sieve::EventSieve;

/// Default capacity of the output channel
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// What to tail and how
#[derive(Clone, Debug)]
pub struct TailOptions {
    /// Log group to tail
    pub group: String,

    /// Streams within the group
    pub stream_pattern: StreamPattern,

    /// Keep polling after the current window is exhausted
    pub follow: bool,

    /// Wait for the log group to appear instead of failing
    pub retry: bool,

    /// Lower bound of the first query window, epoch milliseconds
    pub start_time: i64,

    /// Upper bound, epoch milliseconds (ignored when following)
    pub end_time: Option<i64>,

    /// Server-side filter pattern
    pub include: Option<String>,

    /// Client-side exclusion regex (empty = exclude nothing)
    pub exclude: String,

    pub buffer_size: usize,
    pub cache_ttl: Duration,
    pub purge_interval: Duration,
    pub refresh_interval: Duration,

    /// Maximum number of streams per query
    pub max_streams: usize,
}

impl TailOptions {
    pub fn new(group: impl Into<String>, start_time: i64) -> Self {
        Self {
            group: group.into(),
            stream_pattern: StreamPattern::All,
            follow: false,
            retry: false,
            start_time,
            end_time: None,
            include: None,
            exclude: String::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            cache_ttl: DEFAULT_CACHE_TTL,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            max_streams: MAX_QUERY_STREAMS,
        }
    }

    /// Select streams by pattern (see [`StreamPattern::parse`])
    pub fn streams(mut self, pattern: &str) -> Self {
        self.stream_pattern = StreamPattern::parse(pattern);
        self
    }

    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn end_time(mut self, end_time: Option<i64>) -> Self {
        self.end_time = end_time;
        self
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include = Some(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude = pattern.into();
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn purge_interval(mut self, every: Duration) -> Self {
        self.purge_interval = every;
        self
    }

    pub fn refresh_interval(mut self, every: Duration) -> Self {
        self.refresh_interval = every;
        self
    }

    pub fn max_streams(mut self, max: usize) -> Self {
        self.max_streams = max;
        self
    }
}

/// A running tail.
///
/// Events arrive through [`next`](Self::next). The sequence ends after the
/// last page when not following, after a terminal `Err` item, or once the
/// tail is stopped. Dropping the tail stops every background task.
pub struct Tail {
    events: mpsc::Receiver<Result<LogEvent, TailError>>,
    state: watch::Receiver<PollerState>,
    streams: Arc<StreamSet>,
    cache: Arc<DedupCache>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Tail {
    /// Receive the next event (None = tail finished)
    pub async fn next(&mut self) -> Option<Result<LogEvent, TailError>> {
        self.events.recv().await
    }

    /// Current poller state
    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Streams the next query will be restricted to (empty = whole group)
    pub fn stream_set(&self) -> Vec<String> {
        self.streams.snapshot()
    }

    /// Number of event ids currently remembered for deduplication
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Token that stops the tail when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop all background tasks
    pub fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Check if any task is still running
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

impl Drop for Tail {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start tailing `options.group`.
///
/// Stream discovery runs before this returns, so a log group that cannot be
/// resolved is reported here. With `retry` enabled a missing group is instead
/// waited for in the background and polling starts once it appears.
///
/// `limiter` paces query cycles: each item allows one cycle to start.
pub async fn tail<B, L>(backend: Arc<B>, options: TailOptions, limiter: L) -> Result<Tail, TailError>
where
    B: LogBackend + ?Sized + 'static,
    L: Stream + Unpin + Send + 'static,
{
    let exclude = CompiledFilter::exclude(&options.exclude)?;
    let span = tracing::info_span!("tail", group = %options.group);

    let cancel = CancellationToken::new();
    let cache = Arc::new(DedupCache::new(options.cache_ttl));
    let streams = Arc::new(StreamSet::new());
    let gate = Arc::new(ReadinessGate::new());
    let (output, events) = mpsc::channel(options.buffer_size.max(1));
    let (state_tx, state) = watch::channel(PollerState::Idle);
    let mut tasks = Vec::new();

    if options.stream_pattern.is_all() && !options.retry {
        gate.signal();
    } else {
        let resolver = Arc::new(
            StreamResolver::new(
                Arc::clone(&backend),
                options.group.clone(),
                options.stream_pattern.clone(),
            )
            .with_max_streams(options.max_streams),
        );

        match resolver.resolve().instrument(span.clone()).await {
            Ok(found) => {
                tracing::debug!(parent: &span, count = found.len(), "log streams resolved");
                streams.reset(found);
                gate.signal();
                tasks.push(span.in_scope(|| {
                    Arc::clone(&resolver).spawn_refresh(
                        Arc::clone(&streams),
                        options.refresh_interval,
                        cancel.clone(),
                    )
                }));
            }
            Err(e) if options.retry && resolver.is_retryable(&e) => {
                tracing::warn!(
                    parent: &span,
                    "{}, retry in {}ms",
                    e,
                    DISCOVERY_RETRY_DELAY.as_millis()
                );
                tasks.push(tokio::spawn(
                    discover_in_background(
                        resolver,
                        Arc::clone(&streams),
                        Arc::clone(&gate),
                        output.clone(),
                        options.refresh_interval,
                        cancel.clone(),
                    )
                    .instrument(span.clone()),
                ));
            }
            Err(e) => {
                return Err(TailError::Resolve {
                    group: options.group,
                    source: e,
                });
            }
        }
    }

    tasks.push(span.in_scope(|| cache.spawn_purger(options.purge_interval, cancel.clone())));

    let poller = Poller {
        backend,
        group: options.group.clone(),
        follow: options.follow,
        end_time: options.end_time,
        include: options.include.clone(),
        streams: Arc::clone(&streams),
        gate,
        sieve: EventSieve::new(Arc::clone(&cache), exclude, options.start_time),
        limiter,
        output,
        state: state_tx,
        cancel: cancel.clone(),
    };
    tasks.push(tokio::spawn(poller.run().instrument(span)));

    Ok(Tail {
        events,
        state,
        streams,
        cache,
        cancel,
        tasks,
    })
}

/// Keep resolving until the log group appears, then seed the stream set,
/// open the gate and keep the set fresh. A fatal discovery error is sent to
/// the consumer and stops the tail.
async fn discover_in_background<B>(
    resolver: Arc<StreamResolver<B>>,
    streams: Arc<StreamSet>,
    gate: Arc<ReadinessGate>,
    errors: mpsc::Sender<Result<LogEvent, TailError>>,
    refresh_interval: Duration,
    cancel: CancellationToken,
) where
    B: LogBackend + ?Sized + 'static,
{
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(DISCOVERY_RETRY_DELAY) => {}
    }

    match resolver.resolve_with_retry(&cancel).await {
        None => {}
        Some(Ok(found)) => {
            drop(errors);
            tracing::info!(count = found.len(), "log group available");
            streams.reset(found);
            gate.signal();
            resolver
                .refresh_loop(&streams, refresh_interval, &cancel)
                .await;
        }
        Some(Err(e)) => {
            let _ = errors
                .send(Err(TailError::Resolve {
                    group: resolver.group().to_string(),
                    source: e,
                }))
                .await;
            cancel.cancel();
        }
    }
}
