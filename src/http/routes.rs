use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Device listing
        .route("/devices", get(handlers::list_devices))
        // Session control
        .route("/sessions/start", post(handlers::start_session))
        .route("/sessions/:session_id/pause", post(handlers::pause_session))
        .route(
            "/sessions/:session_id/resume",
            post(handlers::resume_session),
        )
        .route("/sessions/:session_id/stop", post(handlers::stop_session))
        // Session queries
        .route(
            "/sessions/:session_id/status",
            get(handlers::get_session_status),
        )
        .route(
            "/sessions/:session_id/transcript",
            get(handlers::get_session_transcript),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
