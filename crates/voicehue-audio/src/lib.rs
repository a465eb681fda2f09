//! Audio capture for voicehue.
//!
//! Capture backends push [`AudioBuffer`]s through an [`AudioTap`]. The tap
//! never blocks the audio callback thread: buffers go into a bounded queue
//! and are dropped (and counted) when the recognizer falls behind.

#[cfg(feature = "cpal")]
mod capture;
mod tap;
mod wav;

use async_trait::async_trait;
#[cfg(feature = "cpal")]
pub use capture::{CpalCapture, has_input_device};
pub use tap::{AudioStream, AudioTap};
use thiserror::Error;
pub use wav::encode_wav;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// generic anyhow error
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    /// No recording device available
    #[error("no input device available")]
    NoInputDevice,
    /// Sample format not supported
    #[error("sample format not supported: {0}")]
    SampleFormatNotSupported(String),
    /// The device refused the stream configuration
    #[error("failed to configure input stream: {0}")]
    StreamConfig(String),
    /// Capture is already running
    #[error("capture already running")]
    AlreadyRunning,
    /// WAV encoding failed
    #[error(transparent)]
    Encode(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// A chunk of interleaved f32 samples as delivered by the input device.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }
}

/// A source of live audio. `start` installs the tap and begins capture,
/// `stop` halts capture and removes the tap. Both are called from the
/// session's control sequence only and must not block the runtime while a
/// device opens or closes.
#[async_trait]
pub trait AudioCapture: Send {
    async fn start(&mut self, tap: AudioTap) -> Result<()>;

    /// Halt capture and remove the tap. Safe to call when not running.
    async fn stop(&mut self);

    fn is_running(&self) -> bool;
}

pub const MIN_DB: f32 = -96.0;

/// Convert a slice of f32 samples to dBFS.
pub fn db_fs(data: &[f32]) -> f32 {
    let max_sample = data
        .iter()
        .fold(0.0_f32, |max, &sample| sample.abs().max(max));

    (20.0 * max_sample.log10()).clamp(MIN_DB, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_fs() {
        assert_eq!(db_fs(&[0.0, 0.0]), MIN_DB);
        assert_eq!(db_fs(&[1.0, -0.5]), 0.0);
        assert!((db_fs(&[0.5]) + 6.02).abs() < 0.01);
    }
}
