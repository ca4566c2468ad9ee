pub mod batch;
pub mod batcher;
pub mod runner;

pub use batch::{entry_cost, Batch, PER_ENTRY_OVERHEAD};
pub use batcher::{BatcherConfig, ChunkBatcher};
pub use runner::{upload, upload_file, UploadError, UploadReport};
