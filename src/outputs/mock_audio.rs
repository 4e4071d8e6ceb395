use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::kernel::error::SpeechError;
use crate::kernel::event::Severity;
use crate::kernel::speech::output::{SpeechEngine, SpeechFuture};

/// Decrements the active counter however the utterance ends.
struct Playing<'a>(&'a AtomicUsize);

impl Drop for Playing<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpokenLine {
    pub text: String,
    pub priority: Severity,
    /// False when playback was cut off.
    pub finished: bool,
}

/// Word-timed stand-in for a TTS engine.
///
/// Records every utterance it was asked to play and tracks how many played
/// at once, so tests can check playback never overlaps.
#[derive(Debug)]
pub struct MockSpeechEngine {
    per_word: Duration,
    available: AtomicBool,
    spoken: Mutex<Vec<SpokenLine>>,
    active: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl MockSpeechEngine {
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            available: AtomicBool::new(true),
            spoken: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    pub fn shared(per_word: Duration) -> Arc<Self> {
        Arc::new(Self::new(per_word))
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Everything started so far, in order.
    pub fn spoken(&self) -> Vec<SpokenLine> {
        self.spoken.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|l| l.text).collect()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    fn push(&self, line: SpokenLine) -> usize {
        let mut spoken = self.spoken.lock().unwrap_or_else(PoisonError::into_inner);
        spoken.push(line);
        spoken.len() - 1
    }

    fn mark_finished(&self, index: usize) {
        let mut spoken = self.spoken.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(line) = spoken.get_mut(index) {
            line.finished = true;
        }
    }
}

impl SpeechEngine for MockSpeechEngine {
    fn speak<'a>(&'a self, text: &'a str, priority: Severity) -> SpeechFuture<'a> {
        Box::pin(async move {
            if !self.is_available() {
                return Err(SpeechError::Unavailable("mock engine offline".to_string()));
            }

            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            let _playing = Playing(&self.active);
            self.max_concurrent.fetch_max(now_active, Ordering::SeqCst);

            let index = self.push(SpokenLine { text: text.to_string(), priority, finished: false });
            let words = text.split_whitespace().count().max(1) as u32;
            tokio::time::sleep(self.per_word * words).await;
            self.mark_finished(index);
            Ok(())
        })
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
