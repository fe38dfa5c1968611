use cwtail_types::BackendError;

/// Errors that stop a tail
#[derive(Debug, Clone, thiserror::Error)]
pub enum TailError {
    #[error("invalid exclusion pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to resolve log streams for {group}: {source}")]
    Resolve {
        group: String,
        #[source]
        source: BackendError,
    },

    #[error("query against {group} failed: {source}")]
    Query {
        group: String,
        #[source]
        source: BackendError,
    },

    #[error("rate exceeded for {group} after retry")]
    Throttled { group: String },
}

impl TailError {
    /// Classify a page-fetch failure that survived the retry policy
    pub(crate) fn from_query(group: &str, source: BackendError) -> Self {
        if source.is_throttled() {
            Self::Throttled {
                group: group.to_string(),
            }
        } else {
            Self::Query {
                group: group.to_string(),
                source,
            }
        }
    }
}
