use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};
use voicehue_store::{Batch, ColorRecord, RecordStore, StoreError};

use crate::color;
use crate::session::SessionEvent;

/// Turns final transcripts into stored color batches. Every submitted
/// transcript is extracted and committed on its own blocking task; a results
/// collector reports each outcome in submission order.
pub struct ColorPipeline {
    store: Arc<RecordStore>,
    batch_handles: mpsc::UnboundedSender<BatchTask>,
}

type BatchTask = tokio::task::JoinHandle<BatchOutcome>;

#[derive(Debug)]
pub enum SubmitResult {
    Sent { colors: usize },
    NoColors,
}

/// What happened to one submitted batch.
#[derive(Debug)]
pub enum BatchOutcome {
    Committed(Vec<ColorRecord>),
    /// Nothing from the batch was persisted. Not retried.
    Failed(StoreError),
}

impl ColorPipeline {
    /// Create a pipeline over `store`. Must be called inside a tokio runtime.
    ///
    /// The returned receiver sees every outcome; it may be dropped.
    pub fn new(store: Arc<RecordStore>) -> (Self, mpsc::UnboundedReceiver<BatchOutcome>) {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let batch_handles = start_results_collector(outcomes_tx);
        (
            Self {
                store,
                batch_handles,
            },
            outcomes_rx,
        )
    }

    /// Extract colors from a final transcript and commit them as one batch.
    /// Non-blocking.
    pub fn submit(&self, transcript: &str) -> SubmitResult {
        let colors = color::extract(transcript);
        if colors.is_empty() {
            debug!(transcript, "no colors in transcript");
            return SubmitResult::NoColors;
        }
        info!(
            colors = colors.len(),
            names = ?colors.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "transcript submitted"
        );

        // Timestamps are taken here, in token order.
        let batch: Batch = colors.iter().map(|c| color::lookup(c.name())).collect();
        let count = batch.len();

        let store = self.store.clone();
        let handle = tokio::task::spawn_blocking(move || match store.insert_batch(batch) {
            Ok(records) => BatchOutcome::Committed(records),
            Err(e) => BatchOutcome::Failed(e),
        });

        if self.batch_handles.send(handle).is_err() {
            error!("results collector has stopped, batch outcome will not be reported");
        }
        SubmitResult::Sent { colors: count }
    }
}

fn start_results_collector(
    outcomes: mpsc::UnboundedSender<BatchOutcome>,
) -> mpsc::UnboundedSender<BatchTask> {
    let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<BatchTask>();

    tokio::spawn(async move {
        while let Some(task) = task_receiver.recv().await {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Error joining batch writer: {:?}", e);
                    continue;
                }
            };
            match &outcome {
                BatchOutcome::Committed(records) => {
                    info!(records = records.len(), "colors stored");
                }
                BatchOutcome::Failed(e) => {
                    error!(error = %e, "failed to store colors, batch discarded");
                }
            }
            outcomes.send(outcome).ok();
        }
        debug!("results collector ended");
    });

    task_sender
}

/// Forward session events to `observer` and final transcripts to the
/// pipeline until the session ends.
pub async fn drive(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    pipeline: &ColorPipeline,
    mut observer: impl FnMut(&SessionEvent),
) {
    while let Some(event) = events.recv().await {
        observer(&event);
        if let SessionEvent::FinalTranscript(text) = &event {
            pipeline.submit(text);
        }
    }
}
