//! Adapts a batch [`Transcriber`] into a streaming [`RecognitionEngine`].

use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use voicehue_audio::{AudioStream, MIN_DB, db_fs, encode_wav};

use crate::{
    EngineError, EventSink, RecognitionEngine, RecognitionError, RequestConfig, TaskHandle,
    Transcriber,
};

/// Collects audio until the request ends, then transcribes it in one call
/// and reports a single final result.
///
/// Partial results are never reported, whatever the request's
/// `report_partial_results` says. Without an explicit language the hint is
/// taken from the request locale ("en-US" → "en").
pub struct TranscriberEngine<T> {
    transcriber: Arc<T>,
    language: Option<String>,
    retries: u8,
}

impl<T: Transcriber + 'static> TranscriberEngine<T> {
    pub fn new(transcriber: T) -> Self {
        Self {
            transcriber: Arc::new(transcriber),
            language: None,
            retries: 0,
        }
    }

    /// Set the language hint passed to the transcriber, overriding the
    /// request locale.
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    /// Number of extra attempts when the transcriber fails.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }
}

impl<T: Transcriber + 'static> RecognitionEngine for TranscriberEngine<T> {
    fn start(
        &self,
        audio: AudioStream,
        config: RequestConfig,
        events: EventSink,
    ) -> Result<TaskHandle, EngineError> {
        let runtime = Handle::try_current().map_err(|e| EngineError::Unavailable(e.to_string()))?;
        let handle = TaskHandle::new(events.task());

        debug!(
            task = %events.task(),
            transcriber = self.transcriber.name(),
            locale = %config.locale,
            "Starting transcription task"
        );

        let language = self
            .language
            .clone()
            .or_else(|| language_from_locale(&config.locale));

        let join = runtime.spawn(run(
            self.transcriber.clone(),
            language,
            self.retries,
            audio,
            events,
        ));
        handle.attach(join.abort_handle());

        Ok(handle)
    }

    fn name(&self) -> &str {
        self.transcriber.name()
    }
}

/// ISO 639-1 code of a locale such as "en-US" or "pt_BR".
fn language_from_locale(locale: &str) -> Option<String> {
    locale
        .split(['-', '_'])
        .next()
        .filter(|code| code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()))
        .map(str::to_ascii_lowercase)
}

async fn run<T: Transcriber>(
    transcriber: Arc<T>,
    language: Option<String>,
    retries: u8,
    mut audio: AudioStream,
    events: EventSink,
) {
    let mut buffers = Vec::new();
    while let Some(buffer) = audio.recv().await {
        buffers.push(buffer);
    }

    if buffers.iter().all(|b| db_fs(&b.samples) <= MIN_DB) {
        info!(task = %events.task(), buffers = buffers.len(), "no audio captured, nothing to transcribe");
        events.final_result(String::new());
        return;
    }

    let wav = match encode_wav(&buffers) {
        Ok(Some(wav)) => wav,
        Ok(None) => {
            events.final_result(String::new());
            return;
        }
        Err(e) => {
            events.error(RecognitionError::Audio(e.to_string()));
            return;
        }
    };

    let mut remaining = retries;
    let before = Instant::now();
    let mut result = transcriber.transcribe(&wav, language.as_deref()).await;
    while result.is_err() && remaining > 0 {
        warn!("Retrying transcription, previous error: {:?}", result);
        result = transcriber.transcribe(&wav, language.as_deref()).await;
        remaining -= 1;
    }

    match result {
        Ok(text) => {
            info!(
                task = %events.task(),
                duration = ?before.elapsed(),
                bytes = wav.len(),
                "transcription completed"
            );
            events.final_result(text.trim().to_string());
        }
        Err(e) => events.error(e),
    }
}
