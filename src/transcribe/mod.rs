pub mod dispatcher;
pub mod nats;
pub mod provider;

pub use dispatcher::{
    DispatchCounts, DispatcherConfig, Popped, PushResult, TaskQueue, Transcription,
    TranscriptionDispatcher, TranscriptionTask,
};
pub use nats::{NatsTranscriber, TranscribeRequest, TranscribeResponse};
pub use provider::{TranscribeOptions, TranscriptionProvider};
