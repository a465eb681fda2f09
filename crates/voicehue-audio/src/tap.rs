//! Bounded, non-blocking hand-off from the capture callback to the
//! recognizer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use crate::AudioBuffer;

type SenderHandle = Arc<Mutex<Option<mpsc::Sender<AudioBuffer>>>>;

/// The forwarding hook installed on the capture path. Cheap to clone; all
/// clones share one queue. Once [`AudioTap::end_audio`] is called the
/// paired [`AudioStream`] drains and then ends.
#[derive(Debug, Clone)]
pub struct AudioTap {
    sender: SenderHandle,
    dropped: Arc<AtomicU64>,
}

impl AudioTap {
    /// Create a tap and the stream it feeds, holding at most `capacity`
    /// undelivered buffers.
    pub fn channel(capacity: usize) -> (AudioTap, AudioStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let tap = AudioTap {
            sender: Arc::new(Mutex::new(Some(tx))),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (tap, AudioStream { receiver: rx })
    }

    /// Forward a buffer without blocking. Returns false if the buffer was
    /// dropped because the queue is full, the lock is contended or the
    /// audio has ended.
    pub fn forward(&self, buffer: AudioBuffer) -> bool {
        let Some(guard) = self.sender.try_lock() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let Some(sender) = guard.as_ref() else {
            return false;
        };
        match sender.try_send(buffer) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(dropped, "recognizer queue full, dropping buffer");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Signal that no more audio will follow.
    pub fn end_audio(&self) {
        self.sender.lock().take();
    }

    pub fn is_ended(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Buffers dropped so far because the recognizer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The recognizer's end of a tap.
#[derive(Debug)]
pub struct AudioStream {
    receiver: mpsc::Receiver<AudioBuffer>,
}

impl AudioStream {
    /// Next buffer, or `None` once audio has ended and the queue is drained.
    pub async fn recv(&mut self) -> Option<AudioBuffer> {
        self.receiver.recv().await
    }
}
