use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Greeting shown as the first advisor message of a new session
pub const DEFAULT_GREETING: &str =
    "Namaste! I am your AgriSmart Advisor. How can I help you with your farm today?";

/// Conversation language, serialized as a BCP-47 tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    English,
    #[serde(rename = "hi-IN")]
    Hindi,
    #[serde(rename = "mr-IN")]
    Marathi,
}

impl Language {
    /// BCP-47 tag, also used as the speech recognition locale
    pub fn tag(self) -> &'static str {
        match self {
            Self::English => "en-US",
            Self::Hindi => "hi-IN",
            Self::Marathi => "mr-IN",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
            Self::Marathi => "Marathi",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "english" => Ok(Self::English),
            "hi" | "hi-in" | "hindi" => Ok(Self::Hindi),
            "mr" | "mr-in" | "marathi" => Ok(Self::Marathi),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Configuration for a conversation session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "advisory-3f2a...")
    pub session_id: String,

    /// Language the session starts in
    pub language: Language,

    /// Bound on each text-generation and speech-synthesis call
    pub request_timeout: Duration,

    /// Stop all playing audio when a new question is sent
    pub interrupt_on_submit: bool,

    /// Replay plays the cached decoded reply instead of synthesizing again
    pub replay_from_cache: bool,

    /// Export every synthesized reply as WAV into this directory
    pub audio_cache_dir: Option<PathBuf>,

    /// First advisor message; empty disables it
    pub greeting: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("advisory-{}", uuid::Uuid::new_v4()),
            language: Language::English,
            request_timeout: Duration::from_secs(30),
            interrupt_on_submit: false,
            replay_from_cache: false,
            audio_cache_dir: None,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}
