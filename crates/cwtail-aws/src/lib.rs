//! CloudWatch Logs backend for cwtail
//!
//! This crate provides the AWS SDK integration for listing log groups and
//! streams and for querying log events.

mod client;

pub use client::{CloudWatchBackend, classify_error};

// Re-export types that are used in our public API
pub use cwtail_types::{BackendError, EventPage, FilterQuery, LogBackend, LogEvent, StreamPattern};
