pub mod writer;

pub use writer::TranscriptWriter;
