//! Speech recognition seams for voicehue.
//!
//! A [`RecognitionEngine`] consumes a live [`AudioStream`] and reports
//! results through an [`EventSink`]: zero or more partial transcripts, then
//! exactly one final transcript or an error. Each started recognition is
//! represented by a [`TaskHandle`] that the caller may cancel.
//!
//! Batch transcription backends implement [`Transcriber`] and are turned into
//! engines with [`TranscriberEngine`].

mod engine;
#[cfg(feature = "openai")]
mod openai;
mod permission;
mod request;

use async_trait::async_trait;
pub use engine::TranscriberEngine;
#[cfg(feature = "openai")]
pub use openai::{OpenAIClient, OpenAIConfig};
pub use permission::{PermissionProvider, StaticPermission};
pub use request::{
    EngineEvent, EventSink, RecognitionRequest, RequestConfig, TaskEvent, TaskHandle, TaskId,
};
use thiserror::Error;
pub use voicehue_audio::{AudioBuffer, AudioStream, AudioTap};

/// Errors that can occur during transcription.
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("No API key configured")]
    NoApiKey,

    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    #[cfg(feature = "openai")]
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),
}

/// Errors that prevent a recognition task from starting.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("recognizer unavailable: {0}")]
    Unavailable(String),

    #[error("failed to start recognition: {0}")]
    StartFailed(String),
}

/// Errors delivered as the terminal event of a running task.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error(transparent)]
    Transcribe(#[from] TranscribeError),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("recognizer error: {0}")]
    Engine(String),
}

/// Result type for transcription operations.
pub type Result<T> = std::result::Result<T, TranscribeError>;

/// Trait for transcription backends.
///
/// Implement this trait to add new batch transcription backends (e.g. other
/// cloud providers or local models) and wrap them in [`TranscriberEngine`].
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe audio to text.
    ///
    /// # Arguments
    /// * `audio` - Complete WAV file contents.
    /// * `language` - Optional language hint (ISO 639-1 code, e.g., "en")
    async fn transcribe(&self, audio: &[u8], language: Option<&str>) -> Result<String>;

    /// Returns the name of this transcriber for logging/debugging.
    fn name(&self) -> &str;
}

/// A streaming speech recognizer.
///
/// `start` must not block; recognition runs in the background and reports
/// through `events`, which may be invoked from any thread.
pub trait RecognitionEngine: Send + Sync {
    fn start(
        &self,
        audio: AudioStream,
        config: RequestConfig,
        events: EventSink,
    ) -> std::result::Result<TaskHandle, EngineError>;

    /// Returns the name of this engine for logging/debugging.
    fn name(&self) -> &str;
}
