pub mod advisor;
pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod session;

pub use advisor::{AdvisorClient, ImageDiagnoser, SpeechSynthesizer, TextGenerator};
pub use audio::{
    decode, AudioPayload, DecodedAudioBuffer, PlaybackId, PlaybackPolicy, PlaybackScheduler,
    SchedulerConfig,
};
pub use capture::{CaptureBridge, CaptureEvent, CaptureFeed, ChannelCapture, SpeechCapture, UnavailableCapture};
pub use config::Config;
pub use error::{Error, Result};
pub use http::{create_router, AppState};
pub use session::{
    ConversationSession, Language, Message, Role, SessionConfig, SessionStats, SpeechOutcome,
    TurnOutcome, TurnPhase,
};
