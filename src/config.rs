use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{PlaybackPolicy, SchedulerConfig};
use crate::session::{Language, SessionConfig, DEFAULT_GREETING};

/// Environment variable prefix, e.g. `AGRIVOICE__ADVISOR__API_KEY`
pub const ENV_PREFIX: &str = "AGRIVOICE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub advisor: AdvisorConfig,
    pub audio: AudioConfig,
    pub session: SessionSettings,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "agrivoice".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub text_model: String,
    pub speech_model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            text_model: "gemini-3-flash-preview".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            temperature: 0.7,
            request_timeout_secs: 30,
        }
    }
}

impl AdvisorConfig {
    /// Configured key, else `GEMINI_API_KEY`, else `API_KEY`
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub policy: PlaybackPolicy,
    pub poll_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            policy: PlaybackPolicy::Mix,
            poll_interval_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub language: Language,
    pub interrupt_on_submit: bool,
    pub replay_from_cache: bool,
    pub audio_cache_dir: Option<String>,
    pub greeting: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            language: Language::English,
            interrupt_on_submit: false,
            replay_from_cache: false,
            audio_cache_dir: None,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

impl Config {
    /// Load from an optional file (any format the `config` crate knows),
    /// overridden by `AGRIVOICE__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {path}"))?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Session configuration with a fresh session id
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            language: self.session.language,
            request_timeout: self.advisor.request_timeout(),
            interrupt_on_submit: self.session.interrupt_on_submit,
            replay_from_cache: self.session.replay_from_cache,
            audio_cache_dir: self
                .session
                .audio_cache_dir
                .as_deref()
                .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned())),
            greeting: self.session.greeting.clone(),
            ..SessionConfig::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            policy: self.audio.policy,
            poll_interval: Duration::from_millis(self.audio.poll_interval_ms.max(1)),
        }
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture.timeout_secs)
    }
}
