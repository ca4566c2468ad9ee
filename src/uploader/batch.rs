use crate::source::reader::Entry;
use chrono::{DateTime, FixedOffset};

/// Fixed per-event overhead the sink adds to each message when sizing a batch.
pub const PER_ENTRY_OVERHEAD: usize = 26;

/// Bytes an entry counts against a batch's size budget
pub fn entry_cost(entry: &Entry) -> usize {
    entry.message.len() + PER_ENTRY_OVERHEAD
}

/// Entries queued for a single append call.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Queued entries, timestamps non-decreasing
    entries: Vec<Entry>,

    /// Sum of [`entry_cost`] over `entries`
    size: usize,
}

impl Batch {
    pub fn push(&mut self, entry: Entry) {
        self.size += entry_cost(&entry);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn first_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.entries.first().map(|e| e.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.entries.last().map(|e| e.timestamp)
    }

    pub fn max_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.entries.iter().map(|e| e.timestamp).max()
    }
}
