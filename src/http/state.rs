use crate::advisor::ImageDiagnoser;
use crate::session::ConversationSession;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The conversation served by this process
    pub session: Arc<ConversationSession>,

    /// Crop-photo diagnosis, if configured
    pub diagnoser: Option<Arc<dyn ImageDiagnoser>>,
}

impl AppState {
    pub fn new(session: Arc<ConversationSession>) -> Self {
        Self {
            session,
            diagnoser: None,
        }
    }

    pub fn with_diagnoser(mut self, diagnoser: Arc<dyn ImageDiagnoser>) -> Self {
        self.diagnoser = Some(diagnoser);
        self
    }
}
