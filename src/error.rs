//! Error types for the advisory voice pipeline

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agrivoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Audio payload has the wrong shape (odd byte count, partial frame, bad encoding)
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    /// Output device could not be opened or a buffer failed to start
    #[error("playback device error: {0}")]
    PlaybackDevice(String),

    /// Advisory service (text generation, synthesis, diagnosis) failed
    #[error("service error: {0}")]
    Service(String),

    /// External call did not complete in time
    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        /// Which external call timed out
        operation: &'static str,
        /// Configured bound
        after: Duration,
    },

    /// Platform has no speech capture capability
    #[error("speech capture unsupported: {0}")]
    CaptureUnsupported(String),

    /// Capture ended without a transcript (cancelled, no speech, recognizer error)
    #[error("speech capture aborted: {0}")]
    CaptureAborted(String),

    /// A capture is already running
    #[error("speech capture already active")]
    CaptureBusy,

    /// A turn is already awaiting a response
    #[error("session busy: a reply is still pending")]
    SessionBusy,

    /// Session was torn down
    #[error("session closed")]
    SessionClosed,

    /// Message index out of range or not an advisor reply
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WAV encoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    /// Whether the session can carry on after this error.
    ///
    /// Everything raised while a session is running is recoverable; only
    /// configuration and IO problems met at startup are not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Io(_))
    }
}
