use super::traits::{LogSink, SequenceToken, SinkError};
use crate::source::reader::Entry;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Longest span a single append may cover.
const MAX_BATCH_SPAN: Duration = Duration::from_secs(24 * 60 * 60);

/// In-process sink with the same ordering rules as the remote service.
///
/// Tokens are issued as increasing integers. Every accepted batch is kept so
/// callers can inspect exactly what was delivered.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    streams: HashMap<(String, String), MemoryStream>,
    scripted_failures: VecDeque<SinkError>,
    put_calls: usize,
}

#[derive(Debug, Default)]
struct MemoryStream {
    appends: u64,
    batches: Vec<Vec<Entry>>,
}

impl MemoryStream {
    fn expected_token(&self) -> Option<SequenceToken> {
        (self.appends > 0).then(|| SequenceToken::new(self.appends.to_string()))
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream up front, as if another process had created it.
    pub fn create_stream(&self, group: &str, stream: &str) {
        self.lock()
            .streams
            .entry(key(group, stream))
            .or_default();
    }

    /// Fail the next `put_events` call with `error` before any other check.
    pub fn fail_next_put(&self, error: SinkError) {
        self.lock().scripted_failures.push_back(error);
    }

    /// Advance the stream's token without storing anything, making the
    /// token held by any writer stale.
    pub fn advance_token(&self, group: &str, stream: &str) {
        self.lock()
            .streams
            .entry(key(group, stream))
            .or_default()
            .appends += 1;
    }

    /// Accepted batches for a stream, in delivery order
    pub fn batches(&self, group: &str, stream: &str) -> Vec<Vec<Entry>> {
        self.lock()
            .streams
            .get(&key(group, stream))
            .map(|s| s.batches.clone())
            .unwrap_or_default()
    }

    /// Sizes of the accepted batches for a stream
    pub fn batch_sizes(&self, group: &str, stream: &str) -> Vec<usize> {
        self.batches(group, stream).iter().map(Vec::len).collect()
    }

    /// All accepted events for a stream, flattened
    pub fn events(&self, group: &str, stream: &str) -> Vec<Entry> {
        self.batches(group, stream).into_iter().flatten().collect()
    }

    /// Number of `put_events` calls, including rejected ones
    pub fn put_calls(&self) -> usize {
        self.lock().put_calls
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(group: &str, stream: &str) -> (String, String) {
    (group.to_string(), stream.to_string())
}

fn invalid_parameter(message: &str) -> SinkError {
    SinkError::Rejected {
        status: 400,
        code: "InvalidParameterException".to_string(),
        message: message.to_string(),
    }
}

fn validate_batch(events: &[Entry]) -> Result<(), SinkError> {
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return Err(invalid_parameter("empty batch"));
    };

    if events.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
        return Err(invalid_parameter(
            "log events in a single request must be in chronological order",
        ));
    }

    let span = (last.timestamp - first.timestamp).to_std().unwrap_or_default();
    if span > MAX_BATCH_SPAN {
        return Err(invalid_parameter(
            "the batch of log events cannot span more than 24 hours",
        ));
    }

    if events.iter().any(|e| e.message.is_empty()) {
        return Err(invalid_parameter("log event message must not be empty"));
    }

    Ok(())
}

#[async_trait]
impl LogSink for MemorySink {
    async fn resolve_stream(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<SequenceToken>, SinkError> {
        let mut state = self.lock();
        let entry = state.streams.entry(key(group, stream)).or_default();
        Ok(entry.expected_token())
    }

    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        events: &[Entry],
        token: Option<&SequenceToken>,
    ) -> Result<Option<SequenceToken>, SinkError> {
        let mut state = self.lock();
        state.put_calls += 1;

        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }

        let stream_state = state
            .streams
            .get_mut(&key(group, stream))
            .ok_or_else(|| SinkError::ResourceNotFound(format!("{group}/{stream}")))?;

        let expected = stream_state.expected_token();
        if token != expected.as_ref() {
            return Err(SinkError::InvalidSequenceToken { expected });
        }

        validate_batch(events)?;

        stream_state.batches.push(events.to_vec());
        stream_state.appends += 1;
        Ok(stream_state.expected_token())
    }
}
