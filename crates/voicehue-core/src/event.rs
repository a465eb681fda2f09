//! Event types emitted by a recognition engine.

/// A single recognition result. Engines emit zero or more partial results
/// followed by exactly one final result per task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    /// Best transcription so far
    pub text: String,
    /// Whether this is the terminal, authoritative result
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}
