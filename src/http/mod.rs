//! HTTP API server for the dashboard
//!
//! This module provides a REST API over one conversation session:
//! - GET /session - Session status
//! - GET /session/messages - Message history
//! - POST /session/messages - Ask a question
//! - POST /session/messages/:index/replay - Listen again to a reply
//! - PUT /session/language - Change language
//! - POST /session/playback/stop - Stop all playback
//! - DELETE /session/playback/:id - Stop one playback
//! - POST /diagnose - Diagnose a crop photo
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
