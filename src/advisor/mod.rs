//! Hosted advisory service
//!
//! The session only sees the capability traits below; `AdvisorClient`
//! implements all three against the hosted generative-AI REST API.

pub mod client;
pub mod messages;

pub use client::{voice_for, AdvisorClient};

use async_trait::async_trait;

use crate::audio::AudioPayload;
use crate::session::Language;
use crate::Result;

/// Produces advisory text for a farmer's question
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_reply(&self, prompt: &str, language: Language) -> Result<String>;
}

/// Turns reply text into PCM16 speech
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: Language) -> Result<AudioPayload>;
}

/// Diagnoses crop disease or pests from a photo
#[async_trait]
pub trait ImageDiagnoser: Send + Sync {
    async fn diagnose(&self, image: &[u8], mime_type: &str) -> Result<String>;
}
