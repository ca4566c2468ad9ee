pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGTIDE CONFIGURATION
# =============================================================================
# Ships a line-oriented log file to a CloudWatch Logs compatible endpoint.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logtide/config.yml
#   3. /etc/logtide/config.yml
#
# Any value may reference environment variables as $env{NAME}.

# Log file to upload. Lines must start with a timestamp such as
#   2021-01-24T19:13:15.501126+00:00 message
#   [2021-01-24 19:13:15.501] message
#   2021-01-24 19:13:15 message
# Lines without one are appended to the previous entry.
source: ~/serial/device.log

log_group: devices
# Defaults to the host name when omitted
# log_stream: bench-7

sink:
  # Requests are not signed; point this at a signing proxy or an emulator
  endpoint: http://127.0.0.1:4566
  timeout: 30s

batching:
  # Bytes per upload, counting 26 bytes of overhead per entry
  max_batch_size: 1048576
  max_batch_count: 10000
  # Largest distance between the first and last entry of one upload
  max_span: 24h
  # Flush when the next entry arrives this long after the previous one.
  # Required; set to null to disable.
  max_idle: 5m
  min_time_between_flushes: 200ms

resume:
  # Remember the newest uploaded timestamp and skip older entries next run
  enabled: true
  # Defaults to <source>.lus
  # marker_path: /var/lib/logtide/device.log.lus
"#
    .to_string()
}
