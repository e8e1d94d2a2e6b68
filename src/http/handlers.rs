use super::state::AppState;
use crate::audio::PlaybackId;
use crate::session::{Language, Message};
use crate::Error;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitMessageRequest {
    /// Question text (typed or transcribed)
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    pub index: usize,
    pub playback_id: PlaybackId,
}

#[derive(Debug, Deserialize)]
pub struct SetLanguageRequest {
    /// BCP-47 tag or language name
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct LanguageResponse {
    pub language: Language,
}

#[derive(Debug, Serialize)]
pub struct StopPlaybackResponse {
    pub stopped: usize,
}

#[derive(Debug, Deserialize)]
pub struct DiagnoseRequest {
    /// Photo bytes, base64 encoded
    pub image_base64: String,

    /// Photo MIME type (default: image/jpeg)
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DiagnoseResponse {
    pub report: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Status code for a session-level failure
fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::SessionBusy | Error::CaptureBusy => StatusCode::CONFLICT,
        Error::InvalidMessage(_) => StatusCode::NOT_FOUND,
        Error::MalformedAudio(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Service(_) | Error::Http(_) | Error::Serialization(_) => StatusCode::BAD_GATEWAY,
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::SessionClosed | Error::PlaybackDevice(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::CaptureUnsupported(_) => StatusCode::NOT_IMPLEMENTED,
        Error::CaptureAborted(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Config(_) | Error::Io(_) | Error::Wav(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(error: Error) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        error!("Request failed: {}", error);
    } else {
        warn!("Request rejected: {}", error);
    }
    error_response(status, error.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /session
/// Get status of the conversation session
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.session.stats()))
}

/// GET /session/messages
/// Get the message history
pub async fn get_messages(State(state): State<AppState>) -> impl IntoResponse {
    let history: Vec<Message> = state.session.history();
    (StatusCode::OK, Json(history))
}

/// POST /session/messages
/// Ask the advisor a question
pub async fn submit_message(
    State(state): State<AppState>,
    Json(req): Json<SubmitMessageRequest>,
) -> Response {
    match state.session.submit_user_text(&req.text).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => failure(e),
    }
}

/// POST /session/messages/:index/replay
/// Speak an advisor reply again
pub async fn replay_message(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Response {
    info!("Replay requested for message {}", index);

    match state.session.replay(index).await {
        Ok(playback_id) => {
            (StatusCode::OK, Json(ReplayResponse { index, playback_id })).into_response()
        }
        Err(e) => failure(e),
    }
}

/// PUT /session/language
/// Change the session language
pub async fn set_language(
    State(state): State<AppState>,
    Json(req): Json<SetLanguageRequest>,
) -> Response {
    match req.language.parse::<Language>() {
        Ok(language) => {
            state.session.set_language(language);
            (StatusCode::OK, Json(LanguageResponse { language })).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e),
    }
}

/// POST /session/playback/stop
/// Stop everything that is playing or queued
pub async fn stop_playback(State(state): State<AppState>) -> impl IntoResponse {
    let stopped = state.session.scheduler().cancel_all();
    (StatusCode::OK, Json(StopPlaybackResponse { stopped }))
}

/// DELETE /session/playback/:playback_id
/// Stop one playback
pub async fn cancel_playback(
    State(state): State<AppState>,
    Path(playback_id): Path<PlaybackId>,
) -> Response {
    if state.session.scheduler().cancel(playback_id) {
        (StatusCode::OK, Json(StopPlaybackResponse { stopped: 1 })).into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("Playback {} not found", playback_id),
        )
    }
}

/// POST /diagnose
/// Diagnose crop disease or pests from a photo
pub async fn diagnose(State(state): State<AppState>, Json(req): Json<DiagnoseRequest>) -> Response {
    let Some(diagnoser) = state.diagnoser.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Image diagnosis is not configured",
        );
    };

    let image = match base64::engine::general_purpose::STANDARD.decode(req.image_base64.trim()) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, "Image is empty"),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid image: {}", e)),
    };
    let mime_type = req.mime_type.as_deref().unwrap_or("image/jpeg");

    info!("Diagnosing {} byte {} image", image.len(), mime_type);
    match diagnoser.diagnose(&image, mime_type).await {
        Ok(report) => (StatusCode::OK, Json(DiagnoseResponse { report })).into_response(),
        Err(e) => failure(e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
