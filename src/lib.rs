pub mod audio;
pub mod config;
pub mod http;
pub mod session;
pub mod transcribe;
pub mod transcript;

pub use audio::{
    AudioCaptureProvider, AudioChunk, CaptureBuffer, ChunkConfig, ChunkExtractor, ChunkSink,
    ExtractorConfig, InputDevice, SampleSink, StreamHandle, WavCaptureProvider,
};
pub use config::Settings;
pub use http::{create_router, AppState};
pub use session::{RecordingSession, SessionConfig, SessionPhase, SessionStats, TranscriptSegment};
pub use transcribe::{
    DispatchCounts, DispatcherConfig, NatsTranscriber, TranscribeOptions, Transcription,
    TranscriptionDispatcher, TranscriptionProvider, TranscriptionTask,
};
pub use transcript::TranscriptWriter;
