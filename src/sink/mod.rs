pub mod cloudwatch;
pub mod memory;
pub mod traits;

pub use cloudwatch::CloudWatchClient;
pub use memory::MemorySink;
pub use traits::{LogSink, SequenceToken, SinkError};
