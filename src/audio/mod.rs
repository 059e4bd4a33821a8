pub mod capture;
pub mod chunk;
pub mod device;
pub mod extractor;
pub mod file;

pub use capture::{CaptureBuffer, ChunkConfig, SampleSink};
pub use chunk::AudioChunk;
pub use device::{AudioCaptureProvider, DeviceId, InputDevice, StreamHandle};
pub use extractor::{ChunkExtractor, ChunkSink, ExtractorConfig};
pub use file::WavCaptureProvider;
