use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR_PATTERN};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Parse and validate config text.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml)?;

    let mut config: Config = serde_yaml::from_str(&yaml)?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml: &str) -> Result<(), ConfigError> {
    let mut unexpanded: Vec<&str> = ENV_VAR_PATTERN
        .captures_iter(yaml)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .collect();

    if unexpanded.is_empty() {
        return Ok(());
    }

    unexpanded.sort();
    unexpanded.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         \n\
         Set them (e.g. export {}=...) or replace the references in the config file",
        unexpanded.join(", "),
        unexpanded[0]
    )))
}

fn expand_paths(config: &mut Config) {
    config.source = expand_tilde(&config.source);
    if let Some(marker) = config.resume.marker_path.as_mut() {
        *marker = expand_tilde(marker);
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.source.as_os_str().is_empty() {
        errors.push("source: path cannot be empty".to_string());
    }

    if config.log_group.trim().is_empty() {
        errors.push("log_group cannot be empty".to_string());
    }

    if let Some(stream) = &config.log_stream {
        if stream.trim().is_empty() {
            errors.push("log_stream cannot be empty (omit it to use the host name)".to_string());
        } else if stream.contains(':') || stream.contains('*') {
            errors.push(format!(
                "log_stream '{}' cannot contain ':' or '*'",
                stream
            ));
        }
    }

    if config.sink.endpoint.trim().is_empty() {
        errors.push("sink.endpoint cannot be empty".to_string());
    }

    let batching = &config.batching;
    if batching.max_batch_size == 0 {
        errors.push("batching.max_batch_size must be greater than 0".to_string());
    }
    if batching.max_batch_count == 0 {
        errors.push("batching.max_batch_count must be greater than 0".to_string());
    }
    if batching.max_span.is_zero() {
        errors.push("batching.max_span must be greater than 0".to_string());
    }
    if batching.max_idle.is_some_and(|idle| idle.is_zero()) {
        errors.push(
            "batching.max_idle must be greater than 0 (use null to disable idle flushing)"
                .to_string(),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
