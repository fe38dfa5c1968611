//! Log stream tailing engine for cwtail
//!
//! This crate resolves the streams to tail, polls the backend on a limiter
//! cadence, deduplicates events across overlapping query windows and hands
//! them to the caller through a bounded channel.

mod cache;
mod error;
mod filter;
mod gate;
mod limiter;
mod poller;
mod resolver;
mod retry;
mod sieve;
mod tail;

pub use cache::{DEFAULT_CACHE_TTL, DEFAULT_PURGE_INTERVAL, DedupCache};
pub use error::TailError;
pub use filter::CompiledFilter;
pub use gate::ReadinessGate;
pub use limiter::interval_limiter;
pub use poller::{PollerState, query_window};
pub use resolver::{
    DEFAULT_REFRESH_INTERVAL, LIST_IDLE_TIMEOUT, StreamResolver, StreamSet, truncate_to_recent,
};
pub use retry::{DISCOVERY_RETRY_DELAY, Retry, THROTTLE_RETRY_DELAY};
pub use sieve::{Admission, EventSieve};
pub use tail::{DEFAULT_BUFFER_SIZE, Tail, TailOptions, tail};

// Re-export types used in our public API
pub use cwtail_types::{BackendError, EventPage, FilterQuery, LogBackend, LogEvent, StreamPattern};
