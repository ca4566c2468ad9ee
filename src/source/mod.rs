pub mod reader;
pub mod timestamp;

pub use reader::{decode_escaped, Entry, EntryReader, ReaderError};
pub use timestamp::{parse_instant, parse_line, Layout, LineMatch};
