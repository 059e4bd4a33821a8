use super::state::AppState;
use crate::audio::DeviceId;
use crate::session::{RecordingSession, SessionStats, TranscriptSegment};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Capture devices to record from, in label order (Mic1, Mic2, ...)
    pub device_ids: Vec<DeviceId>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub transcript_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub transcript_path: Option<String>,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Start a new recording session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("meeting-{}", uuid::Uuid::new_v4()));

    info!("Starting recording for session: {}", session_id);

    // Check if already recording
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Session {} is already recording", session_id),
                }),
            )
                .into_response();
        }
    }

    let config = state
        .settings
        .session_config(Some(session_id.clone()), req.device_ids);

    let session = Arc::new(RecordingSession::new(
        config,
        Arc::clone(&state.capture),
        Arc::clone(&state.transcriber),
    ));

    // An invalid device selection is rejected here, before anything spawns
    if let Err(e) = session.start().await {
        error!("Failed to start recording: {}", e);
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("Failed to start recording: {}", e),
            }),
        )
            .into_response();
    }

    // Store session
    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), Arc::clone(&session));
    }

    info!("Recording started successfully for session: {}", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id,
            status: "recording".to_string(),
            transcript_path: session
                .transcript_path()
                .map(|p| p.display().to_string()),
        }),
    )
        .into_response()
}

/// POST /sessions/:session_id/pause
/// Pause transcription; capture keeps running
pub async fn pause_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => match session.pause() {
            Ok(()) => (StatusCode::OK, Json(session.stats().await)).into_response(),
            Err(e) => (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response(),
        },
        None => session_not_found(&session_id),
    }
}

/// POST /sessions/:session_id/resume
/// Resume transcription after a pause
pub async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => match session.resume() {
            Ok(()) => (StatusCode::OK, Json(session.stats().await)).into_response(),
            Err(e) => (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response(),
        },
        None => session_not_found(&session_id),
    }
}

/// POST /sessions/:session_id/stop
/// Stop recording for a specific session
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping recording for session: {}", session_id);

    // Find and remove session
    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    match session {
        Some(session) => match session.stop().await {
            Ok(stats) => {
                info!("Recording stopped successfully for session: {}", session_id);
                (
                    StatusCode::OK,
                    Json(StopSessionResponse {
                        session_id,
                        status: "stopped".to_string(),
                        transcript_path: session
                            .transcript_path()
                            .map(|p| p.display().to_string()),
                        stats,
                    }),
                )
                    .into_response()
            }
            Err(e) => {
                error!("Failed to stop recording: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Failed to stop recording: {}", e),
                    }),
                )
                    .into_response()
            }
        },
        None => session_not_found(&session_id),
    }
}

/// GET /sessions/:session_id/status
/// Get status of a recording session
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => (StatusCode::OK, Json(session.stats().await)).into_response(),
        None => session_not_found(&session_id),
    }
}

/// GET /sessions/:session_id/transcript
/// Get transcript for a session (accumulated so far)
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => {
            let transcript: Vec<TranscriptSegment> = session.transcript().await;
            (StatusCode::OK, Json(transcript)).into_response()
        }
        None => session_not_found(&session_id),
    }
}

/// GET /devices
/// List capture devices known to the provider
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    match state.capture.list_input_devices().await {
        Ok(devices) => (StatusCode::OK, Json(devices)).into_response(),
        Err(e) => {
            error!("Failed to list capture devices: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to list capture devices: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn session_not_found(session_id: &str) -> axum::response::Response {
    error!("Session {} not found", session_id);
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session {} not found", session_id),
        }),
    )
        .into_response()
}
