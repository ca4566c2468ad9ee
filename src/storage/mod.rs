pub mod resume;

pub use resume::{marker_path, persist_marker, read_marker, ResumeState, MARKER_SUFFIX};
