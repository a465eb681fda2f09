//! Microphone capture through cpal.
//!
//! `cpal::Stream` is not `Send`, so each capture owns a dedicated thread that
//! opens the stream, reports whether it started, and holds it until stopped.
//! Callers await those reports instead of blocking on the thread.

use std::sync::mpsc;
use std::thread;

use anyhow::anyhow;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::{AudioBuffer, AudioCapture, AudioTap, CaptureError, Result};

/// Whether the default host exposes an input device at all.
pub fn has_input_device() -> bool {
    cpal::default_host().default_input_device().is_some()
}

struct Worker {
    stop: mpsc::Sender<()>,
    stopped: oneshot::Receiver<()>,
}

/// Captures from the default input device.
pub struct CpalCapture {
    buffer_size: u32,
    worker: Option<Worker>,
}

impl CpalCapture {
    /// `buffer_size` is the preferred number of frames per callback; the
    /// device default is used when it is out of the supported range.
    pub fn new(buffer_size: u32) -> Self {
        Self {
            buffer_size,
            worker: None,
        }
    }
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self, tap: AudioTap) -> Result<()> {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stopped_tx, stopped_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let buffer_size = self.buffer_size;

        thread::Builder::new()
            .name("voicehue-capture".into())
            .spawn(move || {
                let stream = match open_stream(tap, buffer_size) {
                    Ok(stream) => stream,
                    Err(e) => {
                        ready_tx.send(Err(e)).ok();
                        return;
                    }
                };
                ready_tx.send(Ok(())).ok();
                // Returns when stop() sends or the capture is dropped.
                stop_rx.recv().ok();
                stream.pause().ok();
                drop(stream);
                stopped_tx.send(()).ok();
            })
            .map_err(|e| CaptureError::Anyhow(e.into()))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.worker = Some(Worker {
                    stop: stop_tx,
                    stopped: stopped_rx,
                });
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow!("capture thread exited before starting").into()),
        }
    }

    async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        info!("Ending capture.");
        worker.stop.send(()).ok();
        if worker.stopped.await.is_err() {
            error!("capture thread panicked");
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        // The thread releases the device on its own once signalled.
        if let Some(worker) = self.worker.take() {
            worker.stop.send(()).ok();
        }
    }
}

fn open_stream(tap: AudioTap, buffer_size: u32) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;
    let supported = device
        .default_input_config()
        .map_err(|_| CaptureError::NoInputDevice)?;

    info!(
        device_name = %device.name().unwrap_or_else(|_| "unknown".into()),
        config = ?supported,
        "Recording from device"
    );

    let mut config = supported.config();
    if let cpal::SupportedBufferSize::Range { min, max } = supported.buffer_size() {
        if (*min..=*max).contains(&buffer_size) {
            config.buffer_size = cpal::BufferSize::Fixed(buffer_size);
        }
    }

    let stream = match supported.sample_format() {
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, tap)?,
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, tap)?,
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, tap)?,
        sample_format => {
            return Err(CaptureError::SampleFormatNotSupported(format!(
                "{:?}",
                sample_format
            )));
        }
    };

    stream
        .play()
        .map_err(|e| CaptureError::StreamConfig(e.to_string()))?;

    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tap: AudioTap,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels;
    let sample_rate = config.sample_rate.0;

    let err_fn = move |err| {
        error!("an error occurred on stream: {}", err);
    };

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples = data.iter().map(|&s| f32::from_sample(s)).collect();
                tap.forward(AudioBuffer::new(samples, channels, sample_rate));
            },
            err_fn,
            None,
        )
        .map_err(|e| CaptureError::StreamConfig(e.to_string()))
}
