use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Default time an event id is remembered after its last sighting
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default cadence of the background purge sweep
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug)]
struct CacheEntry {
    /// Event timestamp in epoch milliseconds
    timestamp: i64,
    /// Last time the id was sighted
    seen_at: Instant,
}

/// Time-windowed set of recently emitted event ids.
///
/// Entries are refreshed on every sighting and dropped by [`purge`](Self::purge)
/// once they have not been seen for longer than the TTL. Recency is measured
/// on the monotonic clock, not on event time, so back-filling old windows
/// deduplicates just as well as tailing live ones.
pub struct DedupCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl DedupCache {
    /// Create an empty cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Check if an event id was seen within the TTL
    pub fn has(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    /// Record a sighting, refreshing the entry if it already exists
    pub fn add(&self, id: &str, timestamp: i64) {
        let entry = CacheEntry {
            timestamp,
            seen_at: Instant::now(),
        };
        let mut entries = self.entries.lock();
        match entries.get_mut(id) {
            Some(existing) => *existing = entry,
            None => {
                entries.insert(id.to_string(), entry);
            }
        }
    }

    /// Event timestamp recorded for an id
    pub fn last_seen(&self, id: &str) -> Option<i64> {
        self.entries.lock().get(id).map(|e| e.timestamp)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop entries not seen for longer than the TTL. Returns how many were removed.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.seen_at) <= self.ttl);
        before - entries.len()
    }

    /// Run [`purge`](Self::purge) every `every` until `cancel` fires.
    /// The task inherits the caller's span.
    pub fn spawn_purger(self: &Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,

                    _ = ticker.tick() => {
                        let removed = cache.purge();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = cache.len(), "purged dedup cache");
                        }
                    }
                }
            }
        }
        .in_current_span())
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
