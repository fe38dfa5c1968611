//! Shared types for cwtail
//!
//! This crate contains the data structures and the backend interface shared by
//! the tailing engine, the CloudWatch backend and the CLI.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Maximum number of stream names a single `FilterLogEvents` call accepts
pub const MAX_QUERY_STREAMS: usize = 100;

// ============================================================================
// Log Types
// ============================================================================

/// A single log event returned by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Backend-assigned unique identifier
    pub event_id: String,

    /// Event time in epoch milliseconds
    pub timestamp: i64,

    /// Time the backend ingested the event, in epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_time: Option<i64>,

    /// Stream the event was written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_stream_name: Option<String>,

    /// Raw message
    pub message: String,
}

impl LogEvent {
    /// Create a new event with minimal fields
    pub fn new(event_id: impl Into<String>, timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
            ingestion_time: None,
            log_stream_name: None,
            message: message.into(),
        }
    }

    /// Set the originating stream name
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.log_stream_name = Some(stream.into());
        self
    }

    /// Event time as a UTC datetime (None if out of range)
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Message without the trailing line break most agents append
    pub fn trimmed_message(&self) -> &str {
        self.message.trim_end_matches(['\n', '\r'])
    }
}

/// Which streams of a log group to tail
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum StreamPattern {
    /// Every stream in the group
    #[default]
    All,
    /// Streams whose name starts with the given prefix
    Prefix(String),
}

impl StreamPattern {
    /// Parse a user-supplied pattern.
    ///
    /// `""` and `"*"` select all streams; a trailing `*` is stripped and the
    /// remainder is used as a name prefix.
    pub fn parse(pattern: &str) -> Self {
        let trimmed = pattern.trim();
        let prefix = trimmed.strip_suffix('*').unwrap_or(trimmed);
        if prefix.is_empty() {
            Self::All
        } else {
            Self::Prefix(prefix.to_string())
        }
    }

    /// Check if this is the wildcard pattern
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Get the name prefix, if any
    pub fn prefix(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Prefix(p) => Some(p),
        }
    }
}

impl fmt::Display for StreamPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Prefix(p) => write!(f, "{}*", p),
        }
    }
}

// ============================================================================
// Query Types
// ============================================================================

/// Parameters for one paginated `FilterLogEvents` query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterQuery {
    pub group: String,

    /// Streams to restrict the query to (empty = all streams)
    pub stream_names: Vec<String>,

    /// Inclusive lower bound in epoch milliseconds
    pub start_time: i64,

    /// Upper bound in epoch milliseconds (None = open ended)
    pub end_time: Option<i64>,

    /// Server-side filter pattern
    pub filter_pattern: Option<String>,
}

impl FilterQuery {
    pub fn new(group: impl Into<String>, start_time: i64) -> Self {
        Self {
            group: group.into(),
            stream_names: Vec::new(),
            start_time,
            end_time: None,
            filter_pattern: None,
        }
    }

    /// Restrict the query to the given streams
    pub fn with_streams(mut self, streams: Vec<String>) -> Self {
        self.stream_names = streams;
        self
    }

    pub fn with_end_time(mut self, end_time: Option<i64>) -> Self {
        self.end_time = end_time;
        self
    }

    /// Set the server-side filter pattern; empty patterns are ignored
    pub fn with_filter_pattern(mut self, pattern: Option<&str>) -> Self {
        self.filter_pattern = pattern.filter(|p| !p.is_empty()).map(str::to_string);
        self
    }
}

/// One page of query results
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventPage {
    pub events: Vec<LogEvent>,

    /// Token for the next page (None = pagination exhausted)
    pub next_token: Option<String>,
}

impl EventPage {
    /// A final page holding the given events
    pub fn last(events: Vec<LogEvent>) -> Self {
        Self {
            events,
            next_token: None,
        }
    }

    /// A page followed by another one
    pub fn more(events: Vec<LogEvent>, next_token: impl Into<String>) -> Self {
        Self {
            events,
            next_token: Some(next_token.into()),
        }
    }
}

// ============================================================================
// Backend Interface
// ============================================================================

/// Errors reported by a log backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("log group not found: {0}")]
    GroupNotFound(String),

    #[error("no log streams in {group} match {pattern}")]
    NoStreams { group: String, pattern: String },

    #[error("rate exceeded")]
    Throttled,

    #[error("no response after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(String),
}

impl BackendError {
    /// The requested group or its streams do not exist (yet)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::GroupNotFound(_) | Self::NoStreams { .. })
    }

    /// The backend asked us to slow down
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled)
    }
}

/// The query and list APIs of a log-storage service
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Lazily list the stream names in `group` matching `pattern`.
    ///
    /// The sequence is finite and not restartable; an `Err` item is terminal.
    fn list_streams(
        &self,
        group: &str,
        pattern: &StreamPattern,
    ) -> BoxStream<'static, Result<String, BackendError>>;

    /// Fetch one page of events matching `query`, continuing from `next_token`
    async fn filter_events(
        &self,
        query: &FilterQuery,
        next_token: Option<String>,
    ) -> Result<EventPage, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_pattern_parse() {
        assert_eq!(StreamPattern::parse(""), StreamPattern::All);
        assert_eq!(StreamPattern::parse("*"), StreamPattern::All);
        assert_eq!(
            StreamPattern::parse("web-*"),
            StreamPattern::Prefix("web-".to_string())
        );
        assert_eq!(
            StreamPattern::parse("web"),
            StreamPattern::Prefix("web".to_string())
        );
        assert_eq!(StreamPattern::parse("web").to_string(), "web*");
    }

    #[test]
    fn test_filter_query_ignores_empty_pattern() {
        let query = FilterQuery::new("group", 10).with_filter_pattern(Some(""));
        assert_eq!(query.filter_pattern, None);

        let query = FilterQuery::new("group", 10).with_filter_pattern(Some("ERROR"));
        assert_eq!(query.filter_pattern.as_deref(), Some("ERROR"));
    }

    #[test]
    fn test_event_time_and_message() {
        let event = LogEvent::new("1", 1_700_000_000_123, "hello\n");
        assert_eq!(event.trimmed_message(), "hello");
        assert_eq!(event.time().unwrap().timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_event_json_skips_missing_fields() {
        let event = LogEvent::new("1", 5, "msg").with_stream("app");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"log_stream_name\":\"app\""));
        assert!(!json.contains("ingestion_time"));
    }

    #[test]
    fn test_error_classification() {
        assert!(BackendError::GroupNotFound("g".into()).is_not_found());
        assert!(BackendError::Throttled.is_throttled());
        assert!(!BackendError::Request("boom".into()).is_throttled());
        assert_eq!(BackendError::Throttled.to_string(), "rate exceeded");
    }
}
