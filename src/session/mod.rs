//! Conversation session management
//!
//! This module provides the `ConversationSession` abstraction that manages:
//! - Message history (append-only, immutable entries)
//! - Turn state: IDLE → AWAITING_TEXT_RESPONSE → AWAITING_SPEECH → IDLE
//! - Speech synthesis and playback of advisor replies
//! - Language selection and capture state

mod config;
mod session;
mod stats;

pub use config::{Language, SessionConfig, DEFAULT_GREETING};
pub use session::{CaptureFlag, ConversationSession};
pub use stats::{
    CachedAudio, Message, Role, SessionStats, SpeechOutcome, TurnOutcome, TurnPhase,
};
