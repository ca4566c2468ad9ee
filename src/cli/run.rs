use crate::config::parse::{load_config, ConfigError};
use crate::config::types::Config;
use crate::sink::cloudwatch::CloudWatchClient;
use crate::sink::traits::{LogSink, SinkError};
use crate::uploader::runner::{upload_file, UploadError, UploadReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("sink setup error: {0}")]
    Sink(#[from] SinkError),

    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/logtide/config.yml");
            eprintln!("  /etc/logtide/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'logtide config init' to generate one.");
            std::process::exit(1);
        }
    };

    let report = run_upload(&config_path).await?;
    println!(
        "Uploaded {} of {} entries in {} batches ({} already uploaded).",
        report.events_delivered, report.entries_read, report.batches_flushed, report.entries_skipped
    );
    Ok(())
}

async fn run_upload(config_path: &Path) -> Result<UploadReport, RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let client = CloudWatchClient::new(config.sink.endpoint.clone(), config.sink.timeout)?;
    info!(endpoint = client.endpoint(), "Sink configured");

    upload_with(Arc::new(client), &config).await
}

/// Run one upload described by `config` against `sink`.
pub async fn upload_with(sink: Arc<dyn LogSink>, config: &Config) -> Result<UploadReport, RunError> {
    let stream = config.stream_name();
    let marker = config.marker_path();

    let report = upload_file(
        sink,
        &config.source,
        &config.log_group,
        &stream,
        &config.batching.batcher_config(),
        marker.as_deref(),
    )
    .await?;

    Ok(report)
}
