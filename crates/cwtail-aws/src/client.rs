use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::Client;
use aws_sdk_cloudwatchlogs::config::Region;
use aws_sdk_cloudwatchlogs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudwatchlogs::types::{FilteredLogEvent, OrderBy};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};

use cwtail_types::{BackendError, EventPage, FilterQuery, LogBackend, LogEvent, StreamPattern};

/// Map an AWS error code to a backend error
pub fn classify_error(code: Option<&str>, group: &str, detail: String) -> BackendError {
    match code {
        Some("ResourceNotFoundException") => BackendError::GroupNotFound(group.to_string()),
        Some("ThrottlingException") | Some("Throttling") => BackendError::Throttled,
        _ => BackendError::Request(detail),
    }
}

fn map_sdk_error<E, R>(group: &str, err: SdkError<E, R>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    classify_error(code.as_deref(), group, DisplayErrorContext(&err).to_string())
}

/// Events without an id cannot be deduplicated and are skipped
fn to_log_event(event: &FilteredLogEvent) -> Option<LogEvent> {
    let Some(event_id) = event.event_id().filter(|id| !id.is_empty()) else {
        tracing::warn!(
            stream = event.log_stream_name().unwrap_or_default(),
            timestamp = event.timestamp(),
            "skipping log event without an id"
        );
        return None;
    };

    Some(LogEvent {
        event_id: event_id.to_string(),
        timestamp: event.timestamp().unwrap_or_default(),
        ingestion_time: event.ingestion_time(),
        log_stream_name: event.log_stream_name().map(str::to_string),
        message: event.message().unwrap_or_default().to_string(),
    })
}

/// CloudWatch Logs client wrapper
#[derive(Clone)]
pub struct CloudWatchBackend {
    client: Client,
}

impl CloudWatchBackend {
    /// Create a new backend from the default AWS credential chain.
    /// `region` and `profile` override the environment when set.
    pub async fn from_env(region: Option<String>, profile: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }

        let config = loader.load().await;
        tracing::debug!(region = ?config.region(), "loaded AWS config");

        Self::new(Client::new(&config))
    }

    /// Wrap an existing SDK client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get all log group names starting with `prefix`
    pub async fn list_groups(&self, prefix: Option<&str>) -> Result<Vec<String>, BackendError> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_log_groups()
                .set_log_group_name_prefix(prefix.map(str::to_string))
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| map_sdk_error(prefix.unwrap_or_default(), e))?;

            groups.extend(
                output
                    .log_groups()
                    .iter()
                    .filter_map(|g| g.log_group_name().map(str::to_string)),
            );

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        tracing::debug!(count = groups.len(), "listed log groups");
        Ok(groups)
    }
}

#[async_trait]
impl LogBackend for CloudWatchBackend {
    fn list_streams(
        &self,
        group: &str,
        pattern: &StreamPattern,
    ) -> BoxStream<'static, Result<String, BackendError>> {
        let client = self.client.clone();
        let group = group.to_string();
        let prefix = pattern.prefix().map(str::to_string);

        // Some(token) = fetch another page, None = listing finished
        let pages = stream::try_unfold(Some(None::<String>), move |state| {
            let client = client.clone();
            let group = group.clone();
            let prefix = prefix.clone();

            async move {
                let Some(next_token) = state else {
                    return Ok::<_, BackendError>(None);
                };

                let mut request = client
                    .describe_log_streams()
                    .log_group_name(&group)
                    .set_next_token(next_token);
                // AWS rejects a name prefix combined with ordering by event time
                request = match prefix {
                    Some(prefix) => request.log_stream_name_prefix(prefix),
                    None => request.order_by(OrderBy::LastEventTime).descending(false),
                };

                let output = request.send().await.map_err(|e| map_sdk_error(&group, e))?;

                let names: Vec<String> = output
                    .log_streams()
                    .iter()
                    .filter_map(|s| s.log_stream_name().map(str::to_string))
                    .collect();
                tracing::trace!(group = %group, count = names.len(), "listed stream page");

                let state = output.next_token().map(|t| Some(t.to_string()));
                Ok(Some((names, state)))
            }
        });

        pages
            .map_ok(|names| stream::iter(names.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    async fn filter_events(
        &self,
        query: &FilterQuery,
        next_token: Option<String>,
    ) -> Result<EventPage, BackendError> {
        let stream_names = (!query.stream_names.is_empty()).then(|| query.stream_names.clone());

        let output = self
            .client
            .filter_log_events()
            .log_group_name(&query.group)
            .set_log_stream_names(stream_names)
            .start_time(query.start_time)
            .set_end_time(query.end_time)
            .set_filter_pattern(query.filter_pattern.clone())
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| map_sdk_error(&query.group, e))?;

        Ok(EventPage {
            events: output.events().iter().filter_map(to_log_event).collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }
}
