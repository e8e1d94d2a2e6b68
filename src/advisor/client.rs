use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, info, warn};

use super::messages::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part, SpeechConfig,
};
use super::{ImageDiagnoser, SpeechSynthesizer, TextGenerator};
use crate::audio::{AudioPayload, SampleFormat, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use crate::config::AdvisorConfig;
use crate::session::Language;
use crate::{Error, Result};

const DIAGNOSIS_PROMPT: &str = "Analyze this crop image. Identify if there's any disease or pest \
infestation. Suggest immediate organic and chemical treatments. Provide the response in clear \
bullet points.";

/// Prebuilt synthesis voice for a language
pub fn voice_for(language: Language) -> &'static str {
    match language {
        Language::English => "Kore",
        Language::Hindi | Language::Marathi => "Puck",
    }
}

fn advisor_instruction(language: Language) -> String {
    format!(
        "You are AgriSmart AI, a professional agricultural advisor.\n\
         Current Language: {} ({}).\n\
         Provide concise, expert advice on crop management, fertilizers, and pest control.\n\
         If the language is Hindi or Marathi, respond in that script.",
        language.name(),
        language.tag()
    )
}

/// Client for the hosted generative-AI service
pub struct AdvisorClient {
    client: reqwest::Client,
    config: AdvisorConfig,
    api_key: String,
}

impl AdvisorClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured or the HTTP client cannot be built
    pub fn new(config: AdvisorConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            Error::Config(
                "advisor API key required (advisor.api_key, GEMINI_API_KEY or API_KEY)".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        info!(
            "Advisor client ready: text={}, speech={}",
            config.text_model, config.speech_model
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model
        );
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Service(format!("{model} request timed out"))
                } else if e.is_connect() {
                    Error::Service(format!("cannot connect to {}", self.config.api_base))
                } else {
                    Error::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Advisor service returned {} for {}", status, model);
            return Err(Error::Service(format!("{model} error {status}: {body}")));
        }

        Ok(response.json::<GenerateContentResponse>().await?)
    }
}

#[async_trait]
impl TextGenerator for AdvisorClient {
    async fn generate_reply(&self, prompt: &str, language: Language) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(prompt)])],
            system_instruction: Some(Content::system(advisor_instruction(language))),
            generation_config: Some(GenerationConfig {
                temperature: Some(self.config.temperature),
                ..Default::default()
            }),
        };

        let response = self.generate(&self.config.text_model, &request).await?;
        response
            .text()
            .ok_or_else(|| Error::Service("advisor returned an empty reply".to_string()))
    }
}

#[async_trait]
impl SpeechSynthesizer for AdvisorClient {
    async fn synthesize(&self, text: &str, language: Language) -> Result<AudioPayload> {
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![Part::text(text)])],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig::prebuilt(voice_for(language))),
                ..Default::default()
            }),
        };

        let response = self.generate(&self.config.speech_model, &request).await?;
        let inline = response
            .inline_data()
            .ok_or_else(|| Error::Service("speech reply carried no audio".to_string()))?;

        let sample_rate = inline.sample_rate().unwrap_or(SPEECH_SAMPLE_RATE);
        debug!(
            "Received speech: {} base64 chars, {} ({}Hz)",
            inline.data.len(),
            inline.mime_type,
            sample_rate
        );

        Ok(AudioPayload {
            data: inline.data.clone(),
            sample_rate,
            channels: SPEECH_CHANNELS,
            format: SampleFormat::S16Le,
        })
    }
}

#[async_trait]
impl ImageDiagnoser for AdvisorClient {
    async fn diagnose(&self, image: &[u8], mime_type: &str) -> Result<String> {
        let data = base64::engine::general_purpose::STANDARD.encode(image);
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![
                Part::inline(mime_type, data),
                Part::text(DIAGNOSIS_PROMPT),
            ])],
            system_instruction: None,
            generation_config: None,
        };

        let response = self.generate(&self.config.text_model, &request).await?;
        response
            .text()
            .ok_or_else(|| Error::Service("diagnosis returned an empty report".to_string()))
    }
}
