use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::config::Language;
use crate::audio::{DecodedAudioBuffer, PlaybackId};

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One entry of the conversation history. Never modified after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// When the message was appended
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Turn-taking phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnPhase {
    #[default]
    Idle,
    AwaitingTextResponse,
    AwaitingSpeech,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::AwaitingTextResponse => write!(f, "AWAITING_TEXT_RESPONSE"),
            Self::AwaitingSpeech => write!(f, "AWAITING_SPEECH"),
        }
    }
}

/// How a turn's speech went
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpeechOutcome {
    /// Reply audio was handed to the scheduler
    Playing { playback_id: PlaybackId },
    /// Speech failed; the text reply stands
    Skipped { reason: String },
}

/// Result of `submit_user_text`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Blank input, nothing happened
    Ignored,
    /// Advisor replied; speech is best-effort
    Completed { reply: String, speech: SpeechOutcome },
    /// Session was closed while the turn was in flight; results dropped
    Discarded,
}

/// Audio kept for an advisor reply, keyed by message index
#[derive(Debug, Clone)]
pub struct CachedAudio {
    pub buffer: Arc<DecodedAudioBuffer>,
    /// WAV export, if an audio cache directory is configured
    pub wav_path: Option<PathBuf>,
}

/// Snapshot of a conversation session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    pub language: Language,

    pub phase: TurnPhase,

    /// Whether a turn is awaiting text or speech
    pub is_awaiting_response: bool,

    /// Whether speech capture is running
    pub is_capturing: bool,

    /// Messages in history, greeting included
    pub message_count: usize,

    pub turns_completed: usize,

    /// Turns that ended without an advisor reply
    pub turns_failed: usize,

    /// Turns whose reply could not be spoken
    pub speech_failures: usize,

    /// Playbacks queued or playing
    pub active_playbacks: usize,

    pub closed: bool,
}
