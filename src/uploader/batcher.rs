use crate::sink::traits::{LogSink, SequenceToken, SinkError};
use crate::source::reader::Entry;
use crate::uploader::batch::{entry_cost, Batch};
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Largest request body the sink accepts, in bytes.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1_048_576;

/// Most events the sink accepts in one request.
pub const DEFAULT_MAX_BATCH_COUNT: usize = 10_000;

/// Longest time range one request may cover.
pub const DEFAULT_MAX_SPAN: Duration = Duration::from_secs(24 * 60 * 60);

pub const DEFAULT_MIN_TIME_BETWEEN_FLUSHES: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatcherConfig {
    pub max_batch_size: usize,
    pub max_batch_count: usize,
    pub max_span: Duration,
    /// Flush a pending batch when the next append comes later than this.
    /// `None` disables idle flushing.
    pub max_idle: Option<Duration>,
    /// Pause after every successful flush
    pub min_time_between_flushes: Duration,
}

impl BatcherConfig {
    /// Sink defaults for everything except the idle bound, which has no
    /// sensible default and must be chosen by the caller.
    pub fn new(max_idle: Option<Duration>) -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_batch_count: DEFAULT_MAX_BATCH_COUNT,
            max_span: DEFAULT_MAX_SPAN,
            max_idle,
            min_time_between_flushes: DEFAULT_MIN_TIME_BETWEEN_FLUSHES,
        }
    }
}

/// Accumulates entries into batches the sink will accept and delivers them
/// in order, carrying the stream's sequence token from one append to the
/// next.
pub struct ChunkBatcher {
    sink: Arc<dyn LogSink>,
    group: String,
    stream: String,
    config: BatcherConfig,

    batch: Batch,
    last_append: Option<Instant>,
    sequence_token: Option<SequenceToken>,

    delivered_watermark: Option<DateTime<FixedOffset>>,
    batches_flushed: u64,
    events_flushed: u64,
}

impl ChunkBatcher {
    pub fn new(
        sink: Arc<dyn LogSink>,
        group: impl Into<String>,
        stream: impl Into<String>,
        config: BatcherConfig,
        sequence_token: Option<SequenceToken>,
    ) -> Self {
        Self {
            sink,
            group: group.into(),
            stream: stream.into(),
            config,
            batch: Batch::default(),
            last_append: None,
            sequence_token,
            delivered_watermark: None,
            batches_flushed: 0,
            events_flushed: 0,
        }
    }

    /// Queue an entry, flushing first when it cannot join the pending batch.
    pub async fn append(&mut self, entry: Entry) -> Result<(), SinkError> {
        if self.idle_expired() {
            debug!(pending = self.batch.len(), "Idle bound exceeded, flushing");
            self.flush().await?;
        }

        if entry.message.is_empty() {
            return Ok(());
        }

        if let Some(reason) = self.boundary_reason(&entry) {
            debug!(reason, pending = self.batch.len(), "Starting new batch");
            self.flush().await?;
        }

        self.batch.push(entry);
        self.last_append = Some(Instant::now());
        Ok(())
    }

    /// Deliver the pending batch, if any.
    ///
    /// A stale sequence token is retried once with the token the sink
    /// reports. Any other failure leaves the batch pending and is returned
    /// as is.
    pub async fn flush(&mut self) -> Result<(), SinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let next_token = match accepted(self.put(self.sequence_token.as_ref()).await) {
            Err(SinkError::InvalidSequenceToken { expected }) => {
                warn!(
                    group = %self.group,
                    stream = %self.stream,
                    "Sequence token rejected, retrying with the expected token"
                );
                accepted(self.put(expected.as_ref()).await)?
            }
            other => other?,
        };

        self.sequence_token = next_token;
        let flushed = std::mem::take(&mut self.batch);
        if let Some(max) = flushed.max_timestamp() {
            self.delivered_watermark = Some(self.delivered_watermark.map_or(max, |w| w.max(max)));
        }
        self.batches_flushed += 1;
        self.events_flushed += flushed.len() as u64;

        debug!(
            events = flushed.len(),
            bytes = flushed.size(),
            batch = self.batches_flushed,
            "Flushed batch"
        );

        if !self.config.min_time_between_flushes.is_zero() {
            sleep(self.config.min_time_between_flushes).await;
        }

        Ok(())
    }

    /// Entries queued but not yet delivered
    pub fn pending(&self) -> &Batch {
        &self.batch
    }

    pub fn sequence_token(&self) -> Option<&SequenceToken> {
        self.sequence_token.as_ref()
    }

    /// Greatest timestamp among successfully delivered entries
    pub fn delivered_watermark(&self) -> Option<DateTime<FixedOffset>> {
        self.delivered_watermark
    }

    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed
    }

    pub fn events_flushed(&self) -> u64 {
        self.events_flushed
    }

    async fn put(&self, token: Option<&SequenceToken>) -> Result<Option<SequenceToken>, SinkError> {
        self.sink
            .put_events(&self.group, &self.stream, self.batch.entries(), token)
            .await
    }

    fn idle_expired(&self) -> bool {
        if self.batch.is_empty() {
            return false;
        }
        match (self.config.max_idle, self.last_append) {
            (Some(max_idle), Some(last)) => last.elapsed() > max_idle,
            _ => false,
        }
    }

    fn boundary_reason(&self, entry: &Entry) -> Option<&'static str> {
        let first = self.batch.first_timestamp()?;
        let last = self.batch.last_timestamp()?;

        if entry.timestamp < last {
            return Some("timestamp went backwards");
        }
        let span = (entry.timestamp - first).to_std().unwrap_or_default();
        if span > self.config.max_span {
            return Some("span limit");
        }
        if self.batch.size() + entry_cost(entry) > self.config.max_batch_size {
            return Some("size limit");
        }
        if self.batch.len() >= self.config.max_batch_count {
            return Some("count limit");
        }
        None
    }
}

/// A batch the sink already holds counts as delivered.
fn accepted(
    result: Result<Option<SequenceToken>, SinkError>,
) -> Result<Option<SequenceToken>, SinkError> {
    match result {
        Err(SinkError::DataAlreadyAccepted { expected }) => {
            warn!("Batch was already accepted by the sink");
            Ok(expected)
        }
        other => other,
    }
}
