use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Conversation
        .route("/session", get(handlers::get_session))
        .route(
            "/session/messages",
            get(handlers::get_messages).post(handlers::submit_message),
        )
        .route(
            "/session/messages/:index/replay",
            post(handlers::replay_message),
        )
        .route("/session/language", put(handlers::set_language))
        // Playback control
        .route("/session/playback/stop", post(handlers::stop_playback))
        .route(
            "/session/playback/:playback_id",
            delete(handlers::cancel_playback),
        )
        // Crop diagnosis
        .route("/diagnose", post(handlers::diagnose))
        // Request logging, and CORS for the browser dashboard
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
