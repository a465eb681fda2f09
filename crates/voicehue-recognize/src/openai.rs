//! OpenAI transcription backend.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};
use voicehue_core::Config;

use crate::{Result, TranscribeError, Transcriber};

const TRANSCRIPTION_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEFAULT_MODEL: &str = "gpt-4o-mini-transcribe";

/// Connection settings for [`OpenAIClient`].
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    /// Model to use (defaults to gpt-4o-mini-transcribe)
    pub model: Option<String>,
    /// Text that primes the model's vocabulary, e.g. the words it should
    /// expect to hear.
    pub prompt: Option<String>,
    endpoint: String,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            prompt: None,
            endpoint: TRANSCRIPTION_ENDPOINT.to_string(),
        }
    }

    /// Build from the application config. Fails without an API key.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.key_openai().ok_or(TranscribeError::NoApiKey)?;
        let mut openai = Self::new(api_key);
        openai.model = config.model().map(str::to_string);
        Ok(openai)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Send requests to an OpenAI-compatible server instead.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Get the model name, using default if not set.
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Uploads whole utterances to the OpenAI transcription API.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    config: OpenAIConfig,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl OpenAIClient {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn form(&self, audio: &[u8], language: Option<&str>) -> Result<Form> {
        let file = Part::bytes(audio.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscribeError::InvalidAudioFormat(e.to_string()))?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.config.model().to_string())
            .text("response_format", "json");
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }
        if let Some(prompt) = &self.config.prompt {
            form = form.text("prompt", prompt.clone());
        }
        Ok(form)
    }
}

/// Turn a failed response into an error, preferring the API's own message.
async fn rejection(status: StatusCode, response: reqwest::Response) -> TranscribeError {
    let message = match response.json::<ErrorEnvelope>().await {
        Ok(envelope) => envelope.error.message,
        Err(_) => status.canonical_reason().unwrap_or("no reason").to_string(),
    };
    warn!(%status, message = %message, "OpenAI rejected transcription request");
    TranscribeError::ApiError(format!("{status}: {message}"))
}

#[async_trait]
impl Transcriber for OpenAIClient {
    async fn transcribe(&self, audio: &[u8], language: Option<&str>) -> Result<String> {
        debug!(
            model = self.config.model(),
            audio_bytes = audio.len(),
            language = ?language,
            "Sending transcription request to OpenAI"
        );

        let response = self
            .http
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .multipart(self.form(audio, language)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejection(status, response).await);
        }

        let transcription: Transcription = response
            .json()
            .await
            .map_err(|e| TranscribeError::TranscriptionFailed(e.to_string()))?;
        Ok(transcription.text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
