use crate::source::timestamp::{parse_line, LineMatch};
use chrono::{DateTime, FixedOffset};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One logical log record: a timestamped line plus any continuation lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub timestamp: DateTime<FixedOffset>,
    pub message: String,
}

impl Entry {
    pub fn new(timestamp: DateTime<FixedOffset>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

/// Lazily turns newline-delimited source text into [`Entry`] values.
///
/// A line that carries no recognised timestamp is folded into the entry
/// opened before it, so an entry is only emitted once the next timestamped
/// line (or the end of the source) is seen.
pub struct EntryReader<R> {
    reader: R,
    line_buf: Vec<u8>,
    open_entry: Option<Entry>,
    line_number: u64,
    dropped_lines: u64,
    failed: bool,
}

impl EntryReader<BufReader<File>> {
    /// Open a file for reading
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> EntryReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: Vec::new(),
            open_entry: None,
            line_number: 0,
            dropped_lines: 0,
            failed: false,
        }
    }

    /// Read the next complete entry, or `None` once the source is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<Entry>, ReaderError> {
        loop {
            let Some(line) = self.read_line()? else {
                return Ok(self.open_entry.take());
            };

            match parse_line(&line) {
                LineMatch::Recognized {
                    timestamp, message, ..
                } => {
                    let next = Entry::new(timestamp, message);
                    if let Some(done) = self.open_entry.replace(next) {
                        return Ok(Some(done));
                    }
                }
                LineMatch::NotRecognized => match self.open_entry.as_mut() {
                    Some(entry) => {
                        entry.message.push('\n');
                        entry.message.push_str(&line);
                    }
                    None => {
                        warn!(
                            line_number = self.line_number,
                            "Dropping line before the first timestamped entry"
                        );
                        self.dropped_lines += 1;
                    }
                },
            }
        }
    }

    /// Lines discarded because no entry was open yet
    pub fn dropped_lines(&self) -> u64 {
        self.dropped_lines
    }

    /// Number of raw lines consumed so far
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    fn read_line(&mut self) -> Result<Option<String>, ReaderError> {
        self.line_buf.clear();
        if self.reader.read_until(b'\n', &mut self.line_buf)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        if self.line_buf.last() == Some(&b'\n') {
            self.line_buf.pop();
            if self.line_buf.last() == Some(&b'\r') {
                self.line_buf.pop();
            }
        }

        Ok(Some(decode_escaped(&self.line_buf)))
    }
}

impl<R: BufRead> Iterator for EntryReader<R> {
    type Item = Result<Entry, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode bytes as UTF-8, rendering every invalid byte as a `\xNN` escape.
pub fn decode_escaped(bytes: &[u8]) -> String {
    let mut decoded = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                decoded.push_str(valid);
                return decoded;
            }
            Err(err) => {
                let (valid, invalid) = rest.split_at(err.valid_up_to());
                decoded.push_str(&String::from_utf8_lossy(valid));

                // A truncated sequence at the end has no error length.
                let bad_len = err.error_len().unwrap_or(invalid.len());
                for byte in &invalid[..bad_len] {
                    let _ = write!(decoded, "\\x{:02x}", byte);
                }
                rest = &invalid[bad_len..];
            }
        }
    }
}
