//! Rendering of log events to stdout

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use cwtail_types::LogEvent;

/// Which fields to print alongside each message
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputOptions {
    pub timestamp: bool,
    pub stream_name: bool,
    pub event_id: bool,
    pub local_time: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: Option<String>,
    stream: Option<&'a str>,
    id: &'a str,
    message: &'a str,
}

/// Formats events as plain lines or JSON objects
pub struct Formatter {
    options: OutputOptions,
}

impl Formatter {
    pub fn new(options: OutputOptions) -> Self {
        Self { options }
    }

    /// Render one event without a trailing newline
    pub fn format(&self, event: &LogEvent) -> Result<String, serde_json::Error> {
        if self.options.json {
            return serde_json::to_string(&JsonLine {
                timestamp: self.timestamp(event),
                stream: event.log_stream_name.as_deref(),
                id: &event.event_id,
                message: event.trimmed_message(),
            });
        }

        let mut parts: Vec<String> = Vec::with_capacity(4);
        if self.options.timestamp {
            parts.push(self.timestamp(event).unwrap_or_else(|| "-".to_string()));
        }
        if self.options.stream_name {
            parts.push(format!("[{}]", event.log_stream_name.as_deref().unwrap_or("-")));
        }
        if self.options.event_id {
            parts.push(format!("({})", event.event_id));
        }
        parts.push(event.trimmed_message().to_string());

        Ok(parts.join(" "))
    }

    fn timestamp(&self, event: &LogEvent) -> Option<String> {
        let time = event.time()?;
        Some(if self.options.local_time {
            time.with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Millis, false)
        } else {
            time.to_rfc3339_opts(SecondsFormat::Millis, true)
        })
    }
}
