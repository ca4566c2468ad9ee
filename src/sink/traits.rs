use crate::source::reader::Entry;
use async_trait::async_trait;
use std::fmt;

/// Continuation handle the sink requires for the next append to a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceToken(String);

impl SequenceToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The token sent was stale; `expected` is the one the sink wants.
    #[error("invalid sequence token (expected {})", .expected.as_ref().map_or("none", SequenceToken::as_str))]
    InvalidSequenceToken { expected: Option<SequenceToken> },

    /// The batch was already stored by an earlier call.
    #[error("batch already accepted (next token {})", .expected.as_ref().map_or("none", SequenceToken::as_str))]
    DataAlreadyAccepted { expected: Option<SequenceToken> },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("sink rejected request with status {status} ({code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only, strictly ordered log stream service.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Find the stream, creating the group and stream when missing.
    ///
    /// Returns the token for the next append, `None` for a fresh stream.
    async fn resolve_stream(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<SequenceToken>, SinkError>;

    /// Append an ordered batch; returns the token for the following append.
    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        events: &[Entry],
        token: Option<&SequenceToken>,
    ) -> Result<Option<SequenceToken>, SinkError>;
}
