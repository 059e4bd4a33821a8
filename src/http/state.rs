use crate::audio::AudioCaptureProvider;
use crate::config::Settings;
use crate::session::RecordingSession;
use crate::transcribe::TranscriptionProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active recording sessions (session_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<RecordingSession>>>>,

    /// Capture provider shared by all sessions
    pub capture: Arc<dyn AudioCaptureProvider>,

    /// Transcription provider shared by all sessions
    pub transcriber: Arc<dyn TranscriptionProvider>,

    /// Service settings used to derive per-session configuration
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        capture: Arc<dyn AudioCaptureProvider>,
        transcriber: Arc<dyn TranscriptionProvider>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            capture,
            transcriber,
            settings,
        }
    }
}
