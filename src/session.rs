//! The speech session: one recognition task at a time, driven by a single
//! control task.
//!
//! Every input (caller commands, the permission answer, engine results and
//! timers) is queued onto one channel and handled in order by the control
//! task, which is the only place session state and the active task are
//! touched. Outputs go to a single [`SessionEvent`] receiver.
//!
//! ```text
//! NoPermission --authorized--> Available --start--> Recording --stop--> Stopping
//!      |                          ^                     |                   |
//!      +--denied--> NotAvailable  +----terminal event---+-------------------+
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use voicehue_audio::{AudioCapture, CaptureError};
use voicehue_core::{Authorization, Config, MAX_AUDIO_QUEUE_CAPACITY, SessionState};
use voicehue_recognize::{
    EngineError, EventSink, PermissionProvider, RecognitionEngine, RecognitionError,
    RecognitionRequest, RequestConfig, TaskEvent, TaskHandle, TaskId,
};

/// Errors surfaced by the session. None of them are fatal; each one leaves
/// the session in a usable state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("speech recognition permission not granted ({0:?})")]
    PermissionDenied(Authorization),
    #[error("failed to configure audio capture: {0}")]
    AudioConfig(#[source] CaptureError),
    #[error("failed to start recognizer: {0}")]
    EngineStart(#[source] EngineError),
    #[error("recognition failed: {0}")]
    Recognition(#[source] RecognitionError),
    #[error("recognizer gave no result within {0:?} of stopping")]
    StopTimeout(Duration),
}

/// Notifications from the session, in the order they happened.
#[derive(Debug)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Interim text for live display; never persisted.
    PartialTranscript(String),
    /// The final transcript of a task. Sent at most once per task.
    FinalTranscript(String),
    Failure(SessionError),
}

/// The external capabilities a session drives.
pub struct SessionDeps {
    pub permission: Arc<dyn PermissionProvider>,
    pub engine: Arc<dyn RecognitionEngine>,
    pub capture: Box<dyn AudioCapture>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub request: RequestConfig,
    pub audio_queue_capacity: usize,
    /// Bound on the Stopping state; `None` waits for the engine forever.
    pub stop_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request: RequestConfig {
                locale: config.locale.clone(),
                report_partial_results: config.report_partial_results,
            },
            audio_queue_capacity: config.audio_queue_capacity(),
            stop_timeout: config.stop_timeout(),
        }
    }
}

#[derive(Debug)]
enum Command {
    Setup,
    Authorization(Authorization),
    Start,
    Stop,
    Toggle,
    Availability(bool),
    Engine(TaskEvent),
    StopTimeout(TaskId),
    Shutdown,
}

/// Handle to a running session. Cheap to clone; every method only enqueues
/// a command and returns immediately.
#[derive(Clone)]
pub struct SpeechSession {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SpeechSession {
    /// Spawn the control task onto the current tokio runtime.
    ///
    /// The session ends when every handle is dropped or on [`shutdown`].
    ///
    /// [`shutdown`]: SpeechSession::shutdown
    pub fn spawn(
        deps: SessionDeps,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::NoPermission);

        event_tx
            .send(SessionEvent::StateChanged(SessionState::NoPermission))
            .ok();

        let controller = Controller {
            permission: deps.permission,
            engine: deps.engine,
            capture: deps.capture,
            options,
            commands: command_tx.downgrade(),
            events: event_tx,
            state: state_tx,
            permission_requested: false,
            authorized: false,
            engine_available: true,
            next_task: 1,
            active: None,
        };
        tokio::spawn(controller.run(command_rx));

        (
            Self {
                commands: command_tx,
                state: state_rx,
            },
            event_rx,
        )
    }

    /// Ask for recognition permission. Only the first call has any effect.
    pub fn setup(&self) {
        self.send(Command::Setup);
    }

    /// Start a new utterance, cancelling any task still in flight.
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Stop capturing. The session returns to Available once the engine
    /// delivers its result.
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Stop when recording, start otherwise.
    pub fn start_stop(&self) {
        self.send(Command::Toggle);
    }

    /// Report that the recognizer became (un)available. May be called from
    /// any thread.
    pub fn engine_availability_changed(&self, available: bool) {
        self.send(Command::Availability(available));
    }

    /// Cancel any active task and end the control task.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// The most recently entered state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("speech session has shut down, command dropped");
        }
    }
}

struct ActiveTask {
    request: RecognitionRequest,
    handle: TaskHandle,
}

impl ActiveTask {
    fn id(&self) -> TaskId {
        self.request.id()
    }
}

struct Controller {
    permission: Arc<dyn PermissionProvider>,
    engine: Arc<dyn RecognitionEngine>,
    capture: Box<dyn AudioCapture>,
    options: SessionOptions,
    // Weak so dropping every handle ends the session.
    commands: mpsc::WeakUnboundedSender<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Sender<SessionState>,
    permission_requested: bool,
    authorized: bool,
    engine_available: bool,
    next_task: u64,
    active: Option<ActiveTask>,
}

impl Controller {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command).await;
        }

        if let Some(active) = self.active.take() {
            self.abandon(active).await;
        }
        debug!("speech session ended");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Setup => self.request_permission(),
            Command::Authorization(status) => self.on_authorization(status),
            Command::Start => self.start().await,
            Command::Stop => self.stop().await,
            Command::Toggle => {
                if self.current() == SessionState::Recording {
                    self.stop().await;
                } else {
                    self.start().await;
                }
            }
            Command::Availability(available) => self.on_availability(available),
            Command::Engine(event) => self.on_engine_event(event).await,
            Command::StopTimeout(task) => self.on_stop_timeout(task).await,
            Command::Shutdown => {}
        }
    }

    fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state.send_replace(state) != state {
            debug!(state = ?state, "session state changed");
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        self.events.send(event).ok();
    }

    fn idle_state(&self) -> SessionState {
        if self.authorized && self.engine_available {
            SessionState::Available
        } else {
            SessionState::NotAvailable
        }
    }

    fn request_permission(&mut self) {
        if self.permission_requested {
            debug!("permission already requested");
            return;
        }
        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        self.permission_requested = true;

        let permission = self.permission.clone();
        tokio::spawn(async move {
            let status = permission.request_authorization().await;
            commands.send(Command::Authorization(status)).ok();
        });
    }

    fn on_authorization(&mut self, status: Authorization) {
        if self.current() != SessionState::NoPermission {
            warn!(status = ?status, "ignoring repeated permission result");
            return;
        }

        info!(status = ?status, "speech recognition permission resolved");
        self.authorized = status.is_authorized();
        let state = self.idle_state();
        self.set_state(state);
        if !self.authorized {
            self.emit(SessionEvent::Failure(SessionError::PermissionDenied(status)));
        }
    }

    fn on_availability(&mut self, available: bool) {
        info!(available, "recognizer availability changed");
        self.engine_available = available;
        // Applied when the active task ends.
        if self.active.is_none() && self.current() != SessionState::NoPermission {
            let state = self.idle_state();
            self.set_state(state);
        }
    }

    async fn start(&mut self) {
        if !self.authorized {
            warn!(state = ?self.current(), "start ignored, recognition not permitted");
            return;
        }
        if !self.engine_available {
            warn!("start ignored, recognizer unavailable");
            return;
        }

        if let Some(active) = self.active.take() {
            info!(task = %active.id(), "cancelling superseded recognition task");
            self.abandon(active).await;
        }

        let Some(commands) = self.commands.upgrade() else {
            return;
        };

        let id = TaskId(self.next_task);
        self.next_task += 1;

        let (request, audio) = RecognitionRequest::new(
            id,
            self.options.request.clone(),
            self.options
                .audio_queue_capacity
                .clamp(1, MAX_AUDIO_QUEUE_CAPACITY),
        );

        if let Err(e) = self.capture.start(request.tap()).await {
            error!(task = %id, error = %e, "failed to start audio capture");
            self.set_state(SessionState::NotAvailable);
            self.emit(SessionEvent::Failure(SessionError::AudioConfig(e)));
            return;
        }

        let sink = EventSink::new(id, move |event| {
            commands.send(Command::Engine(event)).ok();
        });

        match self.engine.start(audio, request.config().clone(), sink) {
            Ok(handle) => {
                info!(task = %id, engine = self.engine.name(), "recognition started");
                self.active = Some(ActiveTask { request, handle });
                self.set_state(SessionState::Recording);
            }
            Err(e) => {
                error!(task = %id, error = %e, "failed to start recognizer");
                self.capture.stop().await;
                request.end_audio();
                self.set_state(SessionState::NotAvailable);
                self.emit(SessionEvent::Failure(SessionError::EngineStart(e)));
            }
        }
    }

    async fn stop(&mut self) {
        if self.current() != SessionState::Recording {
            debug!(state = ?self.current(), "stop ignored, not recording");
            return;
        }
        let Some(id) = self.active.as_ref().map(ActiveTask::id) else {
            return;
        };

        self.capture.stop().await;
        if let Some(active) = &self.active {
            active.request.end_audio();
        }
        info!(task = %id, "recording stopped, waiting for result");
        self.set_state(SessionState::Stopping);
        self.arm_stop_timeout(id);
    }

    fn arm_stop_timeout(&self, task: TaskId) {
        let Some(timeout) = self.options.stop_timeout else {
            return;
        };
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(commands) = commands.upgrade() {
                commands.send(Command::StopTimeout(task)).ok();
            }
        });
    }

    async fn on_engine_event(&mut self, event: TaskEvent) {
        if self.active.as_ref().map(ActiveTask::id) != Some(event.task) {
            debug!(task = %event.task, "ignoring event from superseded task");
            return;
        }

        let terminal = event.is_terminal();
        match event.event {
            Ok(transcript) if !terminal => {
                self.emit(SessionEvent::PartialTranscript(transcript.text));
            }
            Ok(transcript) => self.finish(Some(transcript.text), None).await,
            Err(e) => self.finish(None, Some(SessionError::Recognition(e))).await,
        }
    }

    async fn on_stop_timeout(&mut self, task: TaskId) {
        let waiting = self.current() == SessionState::Stopping
            && self.active.as_ref().map(ActiveTask::id) == Some(task);
        if !waiting {
            return;
        }
        warn!(task = %task, "recognizer did not deliver a result, cancelling");
        let timeout = self.options.stop_timeout.unwrap_or_default();
        if let Some(active) = self.active.take() {
            self.abandon(active).await;
        }
        self.emit(SessionEvent::Failure(SessionError::StopTimeout(timeout)));
        let state = self.idle_state();
        self.set_state(state);
    }

    /// Tear down the active task after its terminal event.
    async fn finish(&mut self, text: Option<String>, failure: Option<SessionError>) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.request.end_audio();
        if self.capture.is_running() {
            self.capture.stop().await;
        }

        let dropped = active.request.dropped_buffers();
        if dropped > 0 {
            warn!(task = %active.id(), dropped, "audio buffers dropped while recognizer was busy");
        }

        match text.filter(|t| !t.trim().is_empty()) {
            Some(text) => {
                info!(task = %active.id(), text = %text, "final transcript");
                self.emit(SessionEvent::FinalTranscript(text));
            }
            None => debug!(task = %active.id(), "task ended without transcript"),
        }
        if let Some(failure) = failure {
            warn!(task = %active.id(), error = %failure, "recognition ended with error");
            self.emit(SessionEvent::Failure(failure));
        }

        let state = self.idle_state();
        self.set_state(state);
    }

    /// Cancel a task whose result is no longer wanted.
    async fn abandon(&mut self, active: ActiveTask) {
        active.handle.cancel();
        active.request.end_audio();
        self.capture.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::timeout;
    use voicehue_audio::AudioBuffer;
    use voicehue_recognize::{StaticPermission, TranscribeError};

    use super::*;
    use crate::testing::{FakeCapture, FakeEngine, GatedCapture, ThreadedPermission};

    struct Harness {
        session: SpeechSession,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        engine: FakeEngine,
        capture: FakeCapture,
    }

    impl Harness {
        fn new(permission: Arc<dyn PermissionProvider>) -> Self {
            let capture = FakeCapture::default();
            let options = SessionOptions {
                stop_timeout: Some(Duration::from_secs(10)),
                ..Default::default()
            };
            Self::with_capture(permission, Box::new(capture.clone()), capture, options)
        }

        fn with_capture(
            permission: Arc<dyn PermissionProvider>,
            device: Box<dyn AudioCapture>,
            capture: FakeCapture,
            options: SessionOptions,
        ) -> Self {
            let engine = FakeEngine::default();
            let (session, events) = SpeechSession::spawn(
                SessionDeps {
                    permission,
                    engine: Arc::new(engine.clone()),
                    capture: device,
                },
                options,
            );
            Self {
                session,
                events,
                engine,
                capture,
            }
        }

        async fn ready() -> Self {
            let mut harness = Self::new(Arc::new(StaticPermission(Authorization::Authorized)));
            harness.session.setup();
            harness.expect_state(SessionState::NoPermission).await;
            harness.expect_state(SessionState::Available).await;
            harness
        }

        async fn recording() -> Self {
            let mut harness = Self::ready().await;
            harness.session.start();
            harness.expect_state(SessionState::Recording).await;
            harness
        }

        async fn next_within(&mut self, limit: Duration) -> SessionEvent {
            timeout(limit, self.events.recv())
                .await
                .expect("timed out waiting for session event")
                .expect("session event channel closed")
        }

        async fn next(&mut self) -> SessionEvent {
            self.next_within(Duration::from_secs(1)).await
        }

        async fn expect_state(&mut self, expected: SessionState) {
            match self.next().await {
                SessionEvent::StateChanged(state) => assert_eq!(state, expected),
                other => panic!("expected StateChanged({expected:?}), got {other:?}"),
            }
        }

        async fn expect_final(&mut self, expected: &str) {
            match self.next().await {
                SessionEvent::FinalTranscript(text) => assert_eq!(text, expected),
                other => panic!("expected FinalTranscript({expected:?}), got {other:?}"),
            }
        }

        async fn expect_quiet(&mut self) {
            let next = timeout(Duration::from_millis(50), self.events.recv()).await;
            assert!(next.is_err(), "unexpected event: {next:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_disables_start() {
        let mut h = Harness::new(Arc::new(StaticPermission(Authorization::Denied)));
        h.session.setup();
        h.expect_state(SessionState::NoPermission).await;
        h.expect_state(SessionState::NotAvailable).await;
        assert!(matches!(
            h.next().await,
            SessionEvent::Failure(SessionError::PermissionDenied(Authorization::Denied))
        ));

        h.session.start();
        h.expect_quiet().await;
        assert_eq!(h.engine.started(), 0);
        assert_eq!(h.capture.starts(), 0);
        assert_eq!(h.session.state(), SessionState::NotAvailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restricted_and_undetermined_are_not_available() {
        for status in [Authorization::Restricted, Authorization::Undetermined] {
            let mut h = Harness::new(Arc::new(StaticPermission(status)));
            h.session.setup();
            h.expect_state(SessionState::NoPermission).await;
            h.expect_state(SessionState::NotAvailable).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_before_permission_is_ignored() {
        let mut h = Harness::new(Arc::new(StaticPermission(Authorization::Authorized)));
        h.expect_state(SessionState::NoPermission).await;
        h.session.start();
        h.expect_quiet().await;
        assert_eq!(h.engine.started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_utterance() {
        let mut h = Harness::recording().await;
        assert_eq!(h.capture.starts(), 1);
        assert_eq!(h.engine.started(), 1);
        assert_eq!(h.engine.config(0), RequestConfig::default());

        // Captured audio reaches the engine through the tap.
        let mut audio = h.engine.take_audio(0);
        let tap = h.capture.tap().unwrap();
        assert!(tap.forward(AudioBuffer::new(vec![0.5; 4], 1, 16_000)));

        h.engine.sink(0).partial("I see red");
        match h.next().await {
            SessionEvent::PartialTranscript(text) => assert_eq!(text, "I see red"),
            other => panic!("unexpected {other:?}"),
        }

        h.session.stop();
        h.expect_state(SessionState::Stopping).await;
        assert!(!h.capture.running());
        assert!(audio.recv().await.is_some());
        assert!(audio.recv().await.is_none(), "end of audio not signalled");

        h.engine.sink(0).final_result("I see red and blue skies");
        h.expect_final("I see red and blue skies").await;
        h.expect_state(SessionState::Available).await;
        h.expect_quiet().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_partials_completes_once() {
        let mut h = Harness::recording().await;
        h.session.stop();
        h.expect_state(SessionState::Stopping).await;

        h.engine.sink(0).final_result("white");
        h.expect_final("white").await;
        h.expect_state(SessionState::Available).await;

        // A second terminal event from the same task must not complete again.
        h.engine.sink(0).final_result("white");
        h.engine.sink(0).error(TranscribeError::NoApiKey);
        h.expect_quiet().await;
        assert_eq!(h.capture.stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancels_prior_task() {
        let mut h = Harness::recording().await;
        h.session.start();
        h.expect_quiet().await;

        assert_eq!(h.engine.started(), 2);
        assert!(h.engine.handle(0).is_cancelled());
        assert!(!h.engine.handle(1).is_cancelled());
        assert_eq!(h.capture.starts(), 2);
        assert_eq!(h.capture.stops(), 1);
        assert_eq!(h.session.state(), SessionState::Recording);

        // The superseded task's result is ignored.
        h.engine.sink(0).final_result("red");
        h.expect_quiet().await;

        h.engine.sink(1).final_result("blue");
        h.expect_final("blue").await;
        h.expect_state(SessionState::Available).await;
        h.expect_quiet().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_while_stopping_cancels_prior_task() {
        let mut h = Harness::recording().await;
        h.session.stop();
        h.expect_state(SessionState::Stopping).await;

        h.session.start();
        h.expect_state(SessionState::Recording).await;
        assert!(h.engine.handle(0).is_cancelled());

        h.engine.sink(0).final_result("red");
        h.engine.sink(1).final_result("green");
        h.expect_final("green").await;
        h.expect_state(SessionState::Available).await;
        h.expect_quiet().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_recognition_error_returns_to_available() {
        let mut h = Harness::recording().await;
        h.engine.sink(0).error(RecognitionError::Engine("network".into()));
        assert!(matches!(
            h.next().await,
            SessionEvent::Failure(SessionError::Recognition(_))
        ));
        h.expect_state(SessionState::Available).await;
        assert!(!h.capture.running());
        h.expect_quiet().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_final_forwards_nothing() {
        let mut h = Harness::recording().await;
        h.session.stop();
        h.expect_state(SessionState::Stopping).await;
        h.engine.sink(0).final_result("  ");
        h.expect_state(SessionState::Available).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_start_failure_is_recoverable() {
        let mut h = Harness::ready().await;
        h.engine.fail_next_start();
        h.session.start();
        h.expect_state(SessionState::NotAvailable).await;
        assert!(matches!(
            h.next().await,
            SessionEvent::Failure(SessionError::EngineStart(_))
        ));
        assert!(!h.capture.running());

        h.session.start();
        h.expect_state(SessionState::Recording).await;
        assert_eq!(h.engine.started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_is_audio_config_error() {
        let mut h = Harness::ready().await;
        h.capture.fail_next_start();
        h.session.start();
        h.expect_state(SessionState::NotAvailable).await;
        assert!(matches!(
            h.next().await,
            SessionEvent::Failure(SessionError::AudioConfig(CaptureError::NoInputDevice))
        ));
        assert_eq!(h.engine.started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_timeout_cancels_stalled_task() {
        let mut h = Harness::recording().await;
        h.session.stop();
        h.expect_state(SessionState::Stopping).await;

        match h.next_within(Duration::from_secs(30)).await {
            SessionEvent::Failure(SessionError::StopTimeout(d)) => {
                assert_eq!(d, Duration::from_secs(10))
            }
            other => panic!("unexpected {other:?}"),
        }
        h.expect_state(SessionState::Available).await;
        assert!(h.engine.handle(0).is_cancelled());

        h.engine.sink(0).final_result("too late");
        h.expect_quiet().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timeout_is_ignored() {
        let mut h = Harness::recording().await;
        h.session.stop();
        h.expect_state(SessionState::Stopping).await;
        h.engine.sink(0).final_result("red");
        h.expect_final("red").await;
        h.expect_state(SessionState::Available).await;

        h.session.start();
        h.expect_state(SessionState::Recording).await;

        // The first task's timer fires while the second is recording.
        tokio::time::sleep(Duration::from_secs(15)).await;
        h.expect_quiet().await;
        assert_eq!(h.session.state(), SessionState::Recording);
        assert!(!h.engine.handle(1).is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle() {
        let mut h = Harness::ready().await;
        h.session.start_stop();
        h.expect_state(SessionState::Recording).await;
        h.session.start_stop();
        h.expect_state(SessionState::Stopping).await;
        h.engine.sink(0).final_result("pink");
        h.expect_final("pink").await;
        h.expect_state(SessionState::Available).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_device_does_not_block_runtime() {
        let gated = GatedCapture::default();
        let mut h = Harness::with_capture(
            Arc::new(StaticPermission(Authorization::Authorized)),
            Box::new(gated.clone()),
            gated.inner().clone(),
            SessionOptions::default(),
        );
        h.session.setup();
        h.expect_state(SessionState::NoPermission).await;
        h.expect_state(SessionState::Available).await;

        // The device is still opening; this single-threaded runtime keeps
        // running the test meanwhile.
        h.session.start();
        h.expect_quiet().await;
        assert_eq!(h.session.state(), SessionState::Available);
        assert_eq!(h.engine.started(), 0);

        gated.open();
        h.expect_state(SessionState::Recording).await;
        assert_eq!(h.capture.starts(), 1);
        assert_eq!(h.engine.started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_queue_capacity_still_records() {
        let capture = FakeCapture::default();
        let options = SessionOptions {
            audio_queue_capacity: usize::MAX,
            ..Default::default()
        };
        let mut h = Harness::with_capture(
            Arc::new(StaticPermission(Authorization::Authorized)),
            Box::new(capture.clone()),
            capture,
            options,
        );
        h.session.setup();
        h.expect_state(SessionState::NoPermission).await;
        h.expect_state(SessionState::Available).await;
        h.session.start();
        h.expect_state(SessionState::Recording).await;

        let tap = h.capture.tap().unwrap();
        assert!(tap.forward(AudioBuffer::new(vec![0.2; 8], 1, 16_000)));
    }

    #[test]
    fn test_options_from_unusable_config() {
        let config = Config {
            stop_timeout: f32::INFINITY,
            audio_queue_capacity: usize::MAX,
            ..Default::default()
        };
        let options = SessionOptions::from_config(&config);
        assert_eq!(options.stop_timeout, None);
        assert_eq!(options.audio_queue_capacity, MAX_AUDIO_QUEUE_CAPACITY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_ignored() {
        let mut h = Harness::ready().await;
        h.session.stop();
        h.expect_quiet().await;
        assert_eq!(h.capture.stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_availability_changes() {
        let mut h = Harness::ready().await;
        h.session.engine_availability_changed(false);
        h.expect_state(SessionState::NotAvailable).await;
        h.session.start();
        h.expect_quiet().await;
        assert_eq!(h.engine.started(), 0);

        h.session.engine_availability_changed(true);
        h.expect_state(SessionState::Available).await;
        h.session.start();
        h.expect_state(SessionState::Recording).await;

        // Deferred until the task ends.
        h.session.engine_availability_changed(false);
        h.expect_quiet().await;
        h.engine.sink(0).final_result("black");
        h.expect_final("black").await;
        h.expect_state(SessionState::NotAvailable).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_active_task() {
        let mut h = Harness::recording().await;
        h.session.shutdown();
        assert!(
            timeout(Duration::from_secs(1), h.events.recv())
                .await
                .unwrap()
                .is_none()
        );
        assert!(h.engine.handle(0).is_cancelled());
        assert!(!h.capture.running());
    }

    #[tokio::test]
    async fn test_permission_requested_once_from_another_thread() {
        let permission = ThreadedPermission::new(Authorization::Authorized);
        let mut h = Harness::new(Arc::new(permission.clone()));
        h.session.setup();
        h.session.setup();
        h.expect_state(SessionState::NoPermission).await;
        h.expect_state(SessionState::Available).await;
        h.session.setup();
        h.expect_quiet().await;
        assert_eq!(permission.calls(), 1);
    }

    #[tokio::test]
    async fn test_results_from_many_threads_complete_once() {
        let mut h = Harness::recording().await;
        let sink = h.engine.sink(0);
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                std::thread::spawn(move || sink.final_result(format!("red {i}")))
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert!(matches!(h.next().await, SessionEvent::FinalTranscript(_)));
        h.expect_state(SessionState::Available).await;
        h.expect_quiet().await;
    }
}
