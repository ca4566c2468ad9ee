use crate::storage::resume::marker_path;
use crate::uploader::batcher::{
    BatcherConfig, DEFAULT_MAX_BATCH_COUNT, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_SPAN,
    DEFAULT_MIN_TIME_BETWEEN_FLUSHES,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log file to ship
    pub source: PathBuf,
    pub log_group: String,
    /// Defaults to the host name when omitted
    #[serde(default)]
    pub log_stream: Option<String>,
    pub sink: SinkConfig,
    pub batching: BatchingConfig,
    #[serde(default)]
    pub resume: ResumeConfig,
}

impl Config {
    pub fn stream_name(&self) -> String {
        self.log_stream.clone().unwrap_or_else(default_stream_name)
    }

    /// Marker location, or `None` when resuming is disabled
    pub fn marker_path(&self) -> Option<PathBuf> {
        if !self.resume.enabled {
            return None;
        }
        Some(
            self.resume
                .marker_path
                .clone()
                .unwrap_or_else(|| marker_path(&self.source)),
        )
    }
}

fn default_stream_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub endpoint: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_batch_count")]
    pub max_batch_count: usize,
    #[serde(with = "humantime_serde", default = "default_max_span")]
    pub max_span: Duration,
    /// Required; `null` disables idle flushing
    #[serde(with = "humantime_serde")]
    pub max_idle: Option<Duration>,
    #[serde(with = "humantime_serde", default = "default_min_time_between_flushes")]
    pub min_time_between_flushes: Duration,
}

impl BatchingConfig {
    pub fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig {
            max_batch_size: self.max_batch_size,
            max_batch_count: self.max_batch_count,
            max_span: self.max_span,
            max_idle: self.max_idle,
            min_time_between_flushes: self.min_time_between_flushes,
        }
    }
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_max_batch_count() -> usize {
    DEFAULT_MAX_BATCH_COUNT
}

fn default_max_span() -> Duration {
    DEFAULT_MAX_SPAN
}

fn default_min_time_between_flushes() -> Duration {
    DEFAULT_MIN_TIME_BETWEEN_FLUSHES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeConfig {
    #[serde(default = "default_resume_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub marker_path: Option<PathBuf>,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            enabled: default_resume_enabled(),
            marker_path: None,
        }
    }
}

fn default_resume_enabled() -> bool {
    true
}
