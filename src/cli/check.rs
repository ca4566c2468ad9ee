use crate::source::reader::{EntryReader, ReaderError};
use std::path::Path;
use tracing::{error, info, warn};

/// Parse `path` without uploading and return the number of entries found.
pub fn check(path: &Path) -> Result<u64, ReaderError> {
    let mut reader = EntryReader::open(path).inspect_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to open log file");
    })?;

    let mut entries = 0u64;
    loop {
        match reader.next_entry() {
            Ok(Some(entry)) => {
                entries += 1;
                if entries == 1 {
                    info!(first = %entry.timestamp.to_rfc3339(), "First entry");
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(
                    path = %path.display(),
                    line = reader.line_number(),
                    error = %e,
                    "Failed to read log file"
                );
                return Err(e);
            }
        }
    }

    if reader.dropped_lines() > 0 {
        warn!(
            dropped = reader.dropped_lines(),
            "Lines before the first timestamp were ignored"
        );
    }

    println!("Successfully processed {} entries of log.", entries);
    Ok(entries)
}
