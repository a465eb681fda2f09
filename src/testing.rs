//! Fakes for the session's external capabilities.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use voicehue_audio::{AudioCapture, AudioStream, AudioTap, CaptureError};
use voicehue_core::Authorization;
use voicehue_recognize::{
    EngineError, EventSink, PermissionProvider, RecognitionEngine, RequestConfig, TaskHandle,
};

pub struct StartedTask {
    pub handle: TaskHandle,
    pub sink: EventSink,
    pub audio: Option<AudioStream>,
    pub config: RequestConfig,
}

#[derive(Default)]
struct EngineLog {
    started: Vec<StartedTask>,
    fail_next: bool,
}

/// Records every start; results are delivered by the test through the
/// captured sinks.
#[derive(Clone, Default)]
pub struct FakeEngine {
    log: Arc<Mutex<EngineLog>>,
}

impl FakeEngine {
    pub fn fail_next_start(&self) {
        self.log.lock().fail_next = true;
    }

    pub fn started(&self) -> usize {
        self.log.lock().started.len()
    }

    pub fn sink(&self, index: usize) -> EventSink {
        self.log.lock().started[index].sink.clone()
    }

    pub fn handle(&self, index: usize) -> TaskHandle {
        self.log.lock().started[index].handle.clone()
    }

    pub fn config(&self, index: usize) -> RequestConfig {
        self.log.lock().started[index].config.clone()
    }

    pub fn take_audio(&self, index: usize) -> AudioStream {
        self.log.lock().started[index]
            .audio
            .take()
            .expect("audio already taken")
    }
}

impl RecognitionEngine for FakeEngine {
    fn start(
        &self,
        audio: AudioStream,
        config: RequestConfig,
        events: EventSink,
    ) -> Result<TaskHandle, EngineError> {
        let mut log = self.log.lock();
        if log.fail_next {
            log.fail_next = false;
            return Err(EngineError::StartFailed("fake engine refused".into()));
        }
        let handle = TaskHandle::new(events.task());
        log.started.push(StartedTask {
            handle: handle.clone(),
            sink: events,
            audio: Some(audio),
            config,
        });
        Ok(handle)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
struct CaptureLog {
    starts: usize,
    stops: usize,
    running: bool,
    fail_next: bool,
    tap: Option<AudioTap>,
}

#[derive(Clone, Default)]
pub struct FakeCapture {
    log: Arc<Mutex<CaptureLog>>,
}

impl FakeCapture {
    pub fn fail_next_start(&self) {
        self.log.lock().fail_next = true;
    }

    pub fn starts(&self) -> usize {
        self.log.lock().starts
    }

    pub fn stops(&self) -> usize {
        self.log.lock().stops
    }

    pub fn running(&self) -> bool {
        self.log.lock().running
    }

    /// The installed tap, if capture is running.
    pub fn tap(&self) -> Option<AudioTap> {
        self.log.lock().tap.clone()
    }
}

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn start(&mut self, tap: AudioTap) -> voicehue_audio::Result<()> {
        let mut log = self.log.lock();
        if log.fail_next {
            log.fail_next = false;
            return Err(CaptureError::NoInputDevice);
        }
        log.starts += 1;
        log.running = true;
        log.tap = Some(tap);
        Ok(())
    }

    async fn stop(&mut self) {
        let mut log = self.log.lock();
        if log.running {
            log.stops += 1;
            log.running = false;
            log.tap = None;
        }
    }

    fn is_running(&self) -> bool {
        self.log.lock().running
    }
}

/// A capture whose device takes until [`GatedCapture::open`] to come up.
#[derive(Clone, Default)]
pub struct GatedCapture {
    gate: Arc<Notify>,
    inner: FakeCapture,
}

impl GatedCapture {
    pub fn open(&self) {
        self.gate.notify_one();
    }

    pub fn inner(&self) -> &FakeCapture {
        &self.inner
    }
}

#[async_trait]
impl AudioCapture for GatedCapture {
    async fn start(&mut self, tap: AudioTap) -> voicehue_audio::Result<()> {
        self.gate.notified().await;
        self.inner.start(tap).await
    }

    async fn stop(&mut self) {
        self.inner.stop().await;
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}

/// Answers with a fixed status from a separate OS thread and counts requests.
#[derive(Clone)]
pub struct ThreadedPermission {
    status: Authorization,
    calls: Arc<AtomicUsize>,
}

impl ThreadedPermission {
    pub fn new(status: Authorization) -> Self {
        Self {
            status,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProvider for ThreadedPermission {
    async fn request_authorization(&self) -> Authorization {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = tokio::sync::oneshot::channel();
        let status = self.status;
        std::thread::spawn(move || {
            tx.send(status).ok();
        });
        rx.await.unwrap_or(Authorization::Undetermined)
    }
}
