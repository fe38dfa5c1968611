use std::sync::Arc;

use cwtail_types::LogEvent;

use crate::cache::DedupCache;
use crate::filter::CompiledFilter;

/// What the sieve decided for one event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// New event at or after the high-water mark
    Fresh,
    /// New event older than the high-water mark; emitted anyway
    Late,
    /// Already emitted within the cache TTL
    Duplicate,
    /// Rejected by the exclusion filter
    Excluded,
}

impl Admission {
    /// Whether the event goes to the output
    pub fn is_emitted(self) -> bool {
        matches!(self, Self::Fresh | Self::Late)
    }
}

/// Per-event admission: exclusion filter, dedup, high-water tracking
pub struct EventSieve {
    cache: Arc<DedupCache>,
    exclude: CompiledFilter,
    high_water: i64,
}

impl EventSieve {
    pub fn new(cache: Arc<DedupCache>, exclude: CompiledFilter, start_time: i64) -> Self {
        Self {
            cache,
            exclude,
            high_water: start_time,
        }
    }

    /// Timestamp of the newest emitted event (or the start time)
    pub fn high_water(&self) -> i64 {
        self.high_water
    }

    /// Decide whether `event` is emitted, recording it in the cache if so
    pub fn admit(&mut self, event: &LogEvent) -> Admission {
        if !self.exclude.matches(&event.message) {
            return Admission::Excluded;
        }

        if self.cache.has(&event.event_id) {
            tracing::debug!(
                event_id = %event.event_id,
                last_seen = ?self.cache.last_seen(&event.event_id),
                "already seen"
            );
            // Still inside the query window, keep it remembered
            self.cache.add(&event.event_id, event.timestamp);
            return Admission::Duplicate;
        }

        let admission = if event.timestamp < self.high_water {
            tracing::warn!(
                event_id = %event.event_id,
                event_ts = event.timestamp,
                last_ts = self.high_water,
                cache_size = self.cache.len(),
                "old event: {}",
                event.trimmed_message()
            );
            Admission::Late
        } else {
            self.high_water = event.timestamp;
            Admission::Fresh
        };

        self.cache.add(&event.event_id, event.timestamp);
        admission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sieve(exclude: &str, start: i64) -> EventSieve {
        EventSieve::new(
            Arc::new(DedupCache::default()),
            CompiledFilter::exclude(exclude).unwrap(),
            start,
        )
    }

    #[tokio::test]
    async fn test_duplicates_are_dropped() {
        let mut sieve = sieve("", 0);
        let event = LogEvent::new("e1", 100, "hello");

        assert_eq!(sieve.admit(&event), Admission::Fresh);
        assert_eq!(sieve.admit(&event), Admission::Duplicate);
    }

    #[tokio::test]
    async fn test_high_water_never_rolls_back() {
        let mut sieve = sieve("", 50);

        assert_eq!(sieve.admit(&LogEvent::new("a", 100, "a")), Admission::Fresh);
        assert_eq!(sieve.high_water(), 100);

        assert_eq!(sieve.admit(&LogEvent::new("b", 80, "b")), Admission::Late);
        assert_eq!(sieve.high_water(), 100);

        assert_eq!(sieve.admit(&LogEvent::new("c", 100, "c")), Admission::Fresh);
        assert_eq!(sieve.admit(&LogEvent::new("d", 120, "d")), Admission::Fresh);
        assert_eq!(sieve.high_water(), 120);
    }

    #[tokio::test]
    async fn test_late_events_are_cached() {
        let mut sieve = sieve("", 100);
        let late = LogEvent::new("late", 10, "late");

        assert!(sieve.admit(&late).is_emitted());
        assert_eq!(sieve.admit(&late), Admission::Duplicate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_extend_recency() {
        let cache = Arc::new(DedupCache::new(Duration::from_secs(60)));
        let mut sieve = EventSieve::new(Arc::clone(&cache), CompiledFilter::default(), 0);
        let event = LogEvent::new("e1", 100, "hello");

        assert_eq!(sieve.admit(&event), Admission::Fresh);
        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(sieve.admit(&event), Admission::Duplicate);
        tokio::time::advance(Duration::from_secs(40)).await;

        assert_eq!(cache.purge(), 0);
        assert_eq!(sieve.admit(&event), Admission::Duplicate);
    }

    #[tokio::test]
    async fn test_excluded_events_skip_the_cache() {
        let cache = Arc::new(DedupCache::default());
        let mut sieve = EventSieve::new(
            Arc::clone(&cache),
            CompiledFilter::exclude("DEBUG").unwrap(),
            0,
        );

        let event = LogEvent::new("x", 5, "DEBUG noisy");
        assert_eq!(sieve.admit(&event), Admission::Excluded);
        assert!(!cache.has("x"));
        assert_eq!(sieve.high_water(), 0);
    }
}
