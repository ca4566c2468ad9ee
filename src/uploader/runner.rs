use crate::sink::traits::{LogSink, SinkError};
use crate::source::reader::{EntryReader, ReaderError};
use crate::storage::resume::ResumeState;
use crate::uploader::batcher::{BatcherConfig, ChunkBatcher};
use chrono::{DateTime, FixedOffset};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Source(#[from] ReaderError),

    #[error("failed to persist resume marker '{}': {source}", .path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Entries produced by the source
    pub entries_read: u64,
    /// Entries at or before the resume marker
    pub entries_skipped: u64,
    pub events_delivered: u64,
    pub batches_flushed: u64,
    /// Marker in effect after the run
    pub marker: Option<DateTime<FixedOffset>>,
}

/// Ship every entry of `source` newer than the resume marker to
/// `group`/`stream`.
///
/// The marker, when a path is given, is only rewritten after the final
/// flush succeeded. Any error leaves it untouched, so the next run resumes
/// from the last confirmed point.
pub async fn upload<R: BufRead>(
    sink: Arc<dyn LogSink>,
    source: EntryReader<R>,
    group: &str,
    stream: &str,
    config: &BatcherConfig,
    resume_marker: Option<&Path>,
) -> Result<UploadReport, UploadError> {
    info!(group, stream, "Starting upload");

    let initial_token = sink.resolve_stream(group, stream).await?;

    let resume = resume_marker.map(ResumeState::new);
    let since = resume.as_ref().and_then(ResumeState::load);

    let mut batcher = ChunkBatcher::new(sink, group, stream, config.clone(), initial_token);
    let mut report = UploadReport::default();

    for entry in source {
        let entry = entry?;
        report.entries_read += 1;

        if since.is_some_and(|marker| entry.timestamp <= marker) {
            report.entries_skipped += 1;
            continue;
        }

        batcher.append(entry).await?;
    }

    batcher.flush().await?;

    report.events_delivered = batcher.events_flushed();
    report.batches_flushed = batcher.batches_flushed();
    report.marker = since;

    if let (Some(resume), Some(watermark)) = (&resume, batcher.delivered_watermark()) {
        resume.save(watermark).map_err(|source| UploadError::Marker {
            path: resume.path().to_path_buf(),
            source,
        })?;
        report.marker = Some(watermark);
    }

    info!(
        entries = report.entries_read,
        skipped = report.entries_skipped,
        delivered = report.events_delivered,
        batches = report.batches_flushed,
        "Upload finished"
    );

    Ok(report)
}

/// [`upload`] for a file on disk.
pub async fn upload_file(
    sink: Arc<dyn LogSink>,
    path: &Path,
    group: &str,
    stream: &str,
    config: &BatcherConfig,
    resume_marker: Option<&Path>,
) -> Result<UploadReport, UploadError> {
    info!(path = %path.display(), "Opening source");
    let source = EntryReader::open(path)?;
    upload(sink, source, group, stream, config, resume_marker).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::memory::MemorySink;
    use crate::storage::resume::{marker_path, read_marker};
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config() -> BatcherConfig {
        BatcherConfig {
            min_time_between_flushes: Duration::ZERO,
            ..BatcherConfig::new(None)
        }
    }

    fn reader(text: &str) -> EntryReader<Cursor<Vec<u8>>> {
        EntryReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    fn at(text: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(text).unwrap()
    }

    const LOG: &str = "\
2021-01-24T19:13:15.501126+00:00 rsyslogd: start
2021-01-24T19:13:16.143911+00:00 kernel: Booting Linux on physical CPU 0x0
2021-01-24T19:13:17.143910+00:00 kernel: Linux version
";

    #[tokio::test]
    async fn test_upload_without_marker() {
        let sink = Arc::new(MemorySink::new());

        let report = upload(sink.clone(), reader(LOG), "foo", "bar", &config(), None)
            .await
            .unwrap();

        assert_eq!(report.entries_read, 3);
        assert_eq!(report.events_delivered, 3);
        assert_eq!(report.batches_flushed, 1);
        assert_eq!(report.marker, None);
        assert_eq!(sink.batch_sizes("foo", "bar"), vec![3]);
    }

    #[tokio::test]
    async fn test_marker_filters_and_advances() {
        let dir = TempDir::new().unwrap();
        let marker = marker_path(&dir.path().join("device.log"));
        std::fs::write(&marker, "2021-01-24T19:13:15.501126+00:00").unwrap();
        let sink = Arc::new(MemorySink::new());

        let report = upload(sink.clone(), reader(LOG), "foo", "bar", &config(), Some(&marker))
            .await
            .unwrap();

        assert_eq!(report.entries_skipped, 1);
        assert_eq!(report.events_delivered, 2);
        assert_eq!(report.marker, Some(at("2021-01-24T19:13:17.143910+00:00")));
        assert_eq!(read_marker(&marker), report.marker);
    }

    #[tokio::test]
    async fn test_marker_untouched_on_sink_failure() {
        let dir = TempDir::new().unwrap();
        let marker = marker_path(&dir.path().join("device.log"));
        let sink = Arc::new(MemorySink::new());
        sink.fail_next_put(SinkError::Rejected {
            status: 403,
            code: "AccessDeniedException".to_string(),
            message: "denied".to_string(),
        });

        let err = upload(sink.clone(), reader(LOG), "foo", "bar", &config(), Some(&marker))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Sink(SinkError::Rejected { status: 403, .. })
        ));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_marker_kept_when_nothing_delivered() {
        let dir = TempDir::new().unwrap();
        let marker = marker_path(&dir.path().join("device.log"));
        std::fs::write(&marker, "2030-01-01T00:00:00+00:00\n").unwrap();
        let sink = Arc::new(MemorySink::new());

        let report = upload(sink.clone(), reader(LOG), "foo", "bar", &config(), Some(&marker))
            .await
            .unwrap();

        assert_eq!(report.entries_skipped, 3);
        assert_eq!(report.events_delivered, 0);
        assert_eq!(sink.put_calls(), 0);
        assert_eq!(report.marker, Some(at("2030-01-01T00:00:00+00:00")));
        assert_eq!(
            std::fs::read_to_string(&marker).unwrap(),
            "2030-01-01T00:00:00+00:00\n"
        );
    }

    #[tokio::test]
    async fn test_upload_file_missing_source() {
        let sink = Arc::new(MemorySink::new());

        let err = upload_file(
            sink,
            Path::new("/nonexistent/logtide/device.log"),
            "foo",
            "bar",
            &config(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::Source(ReaderError::Io(_))));
    }
}
