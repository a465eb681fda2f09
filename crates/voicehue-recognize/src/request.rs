//! Recognition requests, task handles and the event sink engines report to.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use voicehue_audio::{AudioStream, AudioTap};
use voicehue_core::TranscriptEvent;

use crate::RecognitionError;

/// Identifies one recognition task for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Settings handed to the engine with each request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    pub locale: String,
    /// Report results before audio recording is finished
    pub report_partial_results: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            report_partial_results: true,
        }
    }
}

/// One buffered-audio recognition request. Holds the tap side of the audio
/// queue; the engine gets the stream side.
#[derive(Debug)]
pub struct RecognitionRequest {
    id: TaskId,
    tap: AudioTap,
    config: RequestConfig,
}

impl RecognitionRequest {
    pub fn new(id: TaskId, config: RequestConfig, capacity: usize) -> (Self, AudioStream) {
        let (tap, stream) = AudioTap::channel(capacity);
        (Self { id, tap, config }, stream)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// A tap for the capture path that appends into this request.
    pub fn tap(&self) -> AudioTap {
        self.tap.clone()
    }

    /// Tell the engine no more audio will follow.
    pub fn end_audio(&self) {
        self.tap.end_audio();
    }

    /// Buffers dropped because the engine fell behind.
    pub fn dropped_buffers(&self) -> u64 {
        self.tap.dropped()
    }
}

/// Handle to a running recognition task. Cancelling is idempotent and safe
/// after the task has finished.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    inner: Arc<TaskInner>,
}

#[derive(Debug, Default)]
struct TaskInner {
    cancelled: AtomicBool,
    abort: Mutex<Option<AbortHandle>>,
}

impl TaskHandle {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            inner: Arc::default(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Abort this tokio task when the handle is cancelled. If the handle was
    /// already cancelled the task is aborted immediately.
    pub fn attach(&self, abort: AbortHandle) {
        if self.is_cancelled() {
            abort.abort();
            return;
        }
        *self.inner.abort.lock() = Some(abort);
    }

    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(abort) = self.inner.abort.lock().take() {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

/// What an engine reports: a transcript or a terminal error.
pub type EngineEvent = std::result::Result<TranscriptEvent, RecognitionError>;

/// An engine event tagged with the task that produced it.
#[derive(Debug)]
pub struct TaskEvent {
    pub task: TaskId,
    pub event: EngineEvent,
}

impl TaskEvent {
    /// Final transcripts and errors end a task.
    pub fn is_terminal(&self) -> bool {
        match &self.event {
            Ok(transcript) => transcript.is_final,
            Err(_) => true,
        }
    }
}

/// Where an engine delivers results. Callable from any thread; delivery
/// never blocks.
#[derive(Clone)]
pub struct EventSink {
    task: TaskId,
    deliver: Arc<dyn Fn(TaskEvent) + Send + Sync>,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("task", &self.task).finish()
    }
}

impl EventSink {
    pub fn new(task: TaskId, deliver: impl Fn(TaskEvent) + Send + Sync + 'static) -> Self {
        Self {
            task,
            deliver: Arc::new(deliver),
        }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn send(&self, event: EngineEvent) {
        (self.deliver)(TaskEvent {
            task: self.task,
            event,
        });
    }

    pub fn partial(&self, text: impl Into<String>) {
        self.send(Ok(TranscriptEvent::partial(text)));
    }

    pub fn final_result(&self, text: impl Into<String>) {
        self.send(Ok(TranscriptEvent::final_result(text)));
    }

    pub fn error(&self, error: impl Into<RecognitionError>) {
        self.send(Err(error.into()));
    }
}
