use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::kernel::error::SpeechError;
use crate::kernel::event::{Announcement, AnnouncementId, Severity};

pub type SpeechFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SpeechError>> + Send + 'a>>;

/// Text-to-speech black box.
///
/// The returned future resolves when playback ends. Dropping it before then
/// MUST stop playback; that drop is the engine's stop latency.
pub trait SpeechEngine: Send + Sync {
    fn speak<'a>(&'a self, text: &'a str, priority: Severity) -> SpeechFuture<'a>;

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    Cancelled,
    Failed,
    /// Slot already occupied; nothing was played.
    Busy,
}

#[derive(Debug)]
struct Slot {
    id: AnnouncementId,
    token: CancellationToken,
}

/// Single-slot player in front of a `SpeechEngine`.
///
/// Holds no queue. The slot is released only when the engine future has been
/// dropped, so two utterances can never overlap even across a cancel.
pub struct SpeechOutput {
    engine: Arc<dyn SpeechEngine>,
    slot: Mutex<Option<Slot>>,
}

/// Frees the slot when `speak` returns or its future is dropped.
struct SlotRelease<'a> {
    output: &'a SpeechOutput,
    id: AnnouncementId,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        let mut slot = self.output.slot();
        if slot.as_ref().map(|s| s.id) == Some(self.id) {
            *slot = None;
        }
    }
}

impl SpeechOutput {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self { engine, slot: Mutex::new(None) }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Slot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    /// Announcement currently holding the slot.
    pub fn current(&self) -> Option<AnnouncementId> {
        self.slot().as_ref().map(|s| s.id)
    }

    /// Plays one announcement. Resolves on completion, cancel, or failure.
    pub async fn speak(&self, announcement: &Announcement) -> Completion {
        let token = {
            let mut slot = self.slot();
            if let Some(busy) = slot.as_ref() {
                warn!("Speech slot busy with {}, rejecting {}", busy.id, announcement.id);
                return Completion::Busy;
            }
            let token = CancellationToken::new();
            *slot = Some(Slot { id: announcement.id, token: token.clone() });
            token
        };
        let _release = SlotRelease { output: self, id: announcement.id };

        debug!("[AUDIO-{}] {:?}: '{}'", announcement.id, announcement.priority, announcement.text);

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("[AUDIO-{}] cancelled", announcement.id);
                Completion::Cancelled
            }
            result = self.engine.speak(&announcement.text, announcement.priority) => match result {
                Ok(()) => Completion::Finished,
                Err(e) => {
                    warn!("[AUDIO-{}] {}", announcement.id, e);
                    Completion::Failed
                }
            },
        }
    }

    /// Interrupts the current utterance. Idempotent; a no-op when idle.
    /// Returns the id that was interrupted, if any.
    pub fn cancel_current(&self) -> Option<AnnouncementId> {
        let slot = self.slot();
        let current = slot.as_ref()?;
        if current.token.is_cancelled() {
            return None;
        }
        current.token.cancel();
        Some(current.id)
    }
}
