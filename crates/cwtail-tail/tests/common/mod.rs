//! Scripted backend and limiter helpers for tail tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use cwtail_tail::{BackendError, EventPage, FilterQuery, LogBackend, LogEvent, StreamPattern};

/// One scripted answer to `list_streams`
#[allow(dead_code)]
pub enum Listing {
    Streams(Vec<String>),
    Fail(BackendError),
    /// Never yields anything
    Stall,
}

/// Backend that replays scripted listings and pages.
///
/// Once the scripts run out, listings return the fallback streams and
/// queries return the fallback page (empty unless set).
#[derive(Default)]
pub struct MockBackend {
    listings: Mutex<VecDeque<Listing>>,
    fallback_streams: Mutex<Vec<String>>,
    pages: Mutex<VecDeque<Result<EventPage, BackendError>>>,
    fallback_page: Mutex<EventPage>,
    queries: Mutex<Vec<(FilterQuery, Option<String>)>>,
    list_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_streams(self, streams: &[&str]) -> Self {
        *self.fallback_streams.lock() = streams.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_listing(self, listing: Listing) -> Self {
        self.listings.lock().push_back(listing);
        self
    }

    pub fn with_page(self, page: Result<EventPage, BackendError>) -> Self {
        self.pages.lock().push_back(page);
        self
    }

    /// Page returned for every query once the scripted pages are used up
    pub fn with_repeating_page(self, page: EventPage) -> Self {
        *self.fallback_page.lock() = page;
        self
    }

    /// Queue a page while a tail is running
    pub fn push_page(&self, page: Result<EventPage, BackendError>) {
        self.pages.lock().push_back(page);
    }

    /// Every query issued so far with its page token
    pub fn queries(&self) -> Vec<(FilterQuery, Option<String>)> {
        self.queries.lock().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LogBackend for MockBackend {
    fn list_streams(
        &self,
        _group: &str,
        _pattern: &StreamPattern,
    ) -> BoxStream<'static, Result<String, BackendError>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let listing = self
            .listings
            .lock()
            .pop_front()
            .unwrap_or_else(|| Listing::Streams(self.fallback_streams.lock().clone()));

        match listing {
            Listing::Streams(names) => stream::iter(names.into_iter().map(Ok)).boxed(),
            Listing::Fail(e) => stream::iter(vec![Err(e)]).boxed(),
            Listing::Stall => stream::pending::<Result<String, BackendError>>().boxed(),
        }
    }

    async fn filter_events(
        &self,
        query: &FilterQuery,
        next_token: Option<String>,
    ) -> Result<EventPage, BackendError> {
        self.queries.lock().push((query.clone(), next_token));
        self.pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback_page.lock().clone()))
    }
}

/// Event with a stream name derived from its id
pub fn event(id: &str, timestamp: i64) -> LogEvent {
    LogEvent::new(id, timestamp, format!("message {}", id)).with_stream("app")
}

/// Limiter driven by hand: each `send(())` allows one query cycle
#[allow(dead_code)]
pub fn manual_limiter() -> (mpsc::Sender<()>, BoxStream<'static, ()>) {
    let (tx, rx) = mpsc::channel(16);
    let ticks = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|t| (t, rx)) }).boxed();
    (tx, ticks)
}

/// Drain a tail that is expected to finish, collecting event ids
#[allow(dead_code)]
pub async fn collect_ids(tail: &mut cwtail_tail::Tail) -> Vec<String> {
    let mut ids = Vec::new();
    while let Some(item) = tail.next().await {
        ids.push(item.expect("unexpected tail error").event_id);
    }
    ids
}
