//! Fusion core. Every monitor submits here; SpeechOutput pulls from here.
//!
//! # INVARIANTS
//! - At most one announcement is in flight at any instant.
//! - `submit` never blocks and never fails. Overflow sheds, it does not push back.
//! - Severity is the only reordering rule. Equal severities keep arrival order.

pub mod dedup;
pub mod queue;

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use super::config::ArbiterConfig;
use super::event::{Announcement, AnnouncementId, Event, EventSource, Severity};
use super::speech::planner::AnnouncementPlanner;
use dedup::DedupState;
use queue::{Pending, PendingQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted. Carries the in-flight announcement it displaced, if any.
    Queued { preempted: Option<AnnouncementId> },
    /// Equivalent to a recent or pending announcement.
    Suppressed,
    /// Accepted and immediately shed by the depth bound.
    Dropped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArbiterStats {
    pub submitted: u64,
    pub suppressed: u64,
    /// Shed by the queue bound (QueueOverflow).
    pub dropped: u64,
    pub preempted: u64,
    pub announced: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    id: AnnouncementId,
    severity: Severity,
    source: EventSource,
}

/// Whether `incoming` may cut off the announcement currently playing.
pub fn preempts(
    incoming: (Severity, EventSource),
    in_flight: (Severity, EventSource),
) -> bool {
    if incoming.0 > in_flight.0 {
        return true;
    }
    // Life-safety: a Critical obstacle always cuts off non-obstacle speech.
    incoming == (Severity::Critical, EventSource::Proximity) && in_flight.1 != EventSource::Proximity
}

/// Single-threaded arbitration state. Callers serialize access; the shared
/// `Arbiter` handle does so with a mutex.
#[derive(Debug)]
pub struct ArbiterCore {
    queue: PendingQueue,
    dedup: DedupState,
    planner: AnnouncementPlanner,
    max_latency: Duration,
    in_flight: Option<InFlight>,
    next_seq: u64,
    next_id: u64,
    stats: ArbiterStats,
}

impl ArbiterCore {
    pub fn new(config: &ArbiterConfig, max_latency: Duration) -> Self {
        Self {
            queue: PendingQueue::new(config.max_queue_depth),
            dedup: DedupState::new(config.reannounce_interval()),
            planner: AnnouncementPlanner::new(),
            max_latency,
            in_flight: None,
            next_seq: 0,
            next_id: 0,
            stats: ArbiterStats::default(),
        }
    }

    pub fn submit(&mut self, event: Event) -> SubmitOutcome {
        self.stats.submitted += 1;
        let key = event.dedup_key();
        let severity = event.severity;
        let source = event.source();

        // 1. Dedup against what was said and what is about to be said.
        if self.dedup.should_suppress(&key, severity, event.timestamp)
            || self.queue.holds_equivalent(&key, severity)
        {
            self.stats.suppressed += 1;
            debug!("Suppressed repeat {:?}/{} ({:?})", key.source, key.bucket, severity);
            return SubmitOutcome::Suppressed;
        }

        // 2. Enqueue under the depth bound.
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(shed) = self.queue.push(Pending { seq, key, event }) {
            self.stats.dropped += 1;
            warn!(
                "Queue overflow: shed {:?}/{} ({:?}), {} dropped so far",
                shed.key.source, shed.key.bucket, shed.event.severity, self.stats.dropped
            );
            if shed.seq == seq {
                return SubmitOutcome::Dropped;
            }
        }

        // 3. Preempt the in-flight announcement if this outranks it.
        let preempted = match self.in_flight {
            Some(f) if preempts((severity, source), (f.severity, f.source)) => {
                self.in_flight = None;
                self.stats.preempted += 1;
                info!("{:?} {:?} preempts {} ({:?} {:?})", severity, source, f.id, f.severity, f.source);
                Some(f.id)
            }
            _ => None,
        };

        SubmitOutcome::Queued { preempted }
    }

    /// Hands out the next announcement, or `None` if one is already in flight
    /// or nothing is pending.
    pub fn next_announcement(&mut self, now: Instant) -> Option<Announcement> {
        if self.in_flight.is_some() {
            return None;
        }

        while let Some(pending) = self.queue.pop_next() {
            let Pending { key, event, .. } = pending;
            // Key may have been spoken while this entry waited.
            if self.dedup.should_suppress(&key, event.severity, event.timestamp) {
                self.stats.suppressed += 1;
                debug!("Suppressed stale repeat {:?}/{}", key.source, key.bucket);
                continue;
            }

            let id = AnnouncementId(self.next_id);
            self.next_id += 1;

            let source = event.source();
            if let Some(rearmed) = event.rearmed_key() {
                if self.dedup.forget(&rearmed) {
                    debug!("{:?}/{} re-armed", rearmed.source, rearmed.bucket);
                }
            }
            self.dedup.record(key, event.severity, now);
            self.in_flight = Some(InFlight { id, severity: event.severity, source });
            self.stats.announced += 1;

            return Some(Announcement {
                id,
                text: self.planner.phrase(&event),
                priority: event.severity,
                source,
                event_timestamp: event.timestamp,
                deadline: event.timestamp + self.max_latency,
            });
        }
        None
    }

    /// SpeechOutput finished or abandoned `id`. Stale ids (already preempted)
    /// are ignored.
    pub fn complete(&mut self, id: AnnouncementId) -> bool {
        match self.in_flight {
            Some(f) if f.id == id => {
                self.in_flight = None;
                self.stats.completed += 1;
                true
            }
            _ => false,
        }
    }

    pub fn in_flight(&self) -> Option<AnnouncementId> {
        self.in_flight.map(|f| f.id)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &ArbiterStats {
        &self.stats
    }
}

struct Shared {
    core: Mutex<ArbiterCore>,
    ready: Notify,
    preempt: watch::Sender<Option<AnnouncementId>>,
}

/// Cloneable handle over one `ArbiterCore`.
///
/// The lock is held only for the O(queue depth) body of each call, never
/// across an await.
#[derive(Clone)]
pub struct Arbiter {
    shared: Arc<Shared>,
}

impl Arbiter {
    pub fn new(config: &ArbiterConfig, max_latency: Duration) -> Self {
        let (preempt, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(ArbiterCore::new(config, max_latency)),
                ready: Notify::new(),
                preempt,
            }),
        }
    }

    fn core(&self) -> MutexGuard<'_, ArbiterCore> {
        // Every core method leaves state consistent between statements.
        self.shared.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit(&self, event: Event) -> SubmitOutcome {
        let outcome = self.core().submit(event);
        if let SubmitOutcome::Queued { preempted } = outcome {
            if let Some(id) = preempted {
                self.shared.preempt.send_replace(Some(id));
            }
            self.shared.ready.notify_one();
        }
        outcome
    }

    pub fn next_announcement(&self, now: Instant) -> Option<Announcement> {
        self.core().next_announcement(now)
    }

    pub fn complete(&self, id: AnnouncementId) -> bool {
        let released = self.core().complete(id);
        if released {
            self.shared.ready.notify_one();
        }
        released
    }

    /// Resolves once something was queued or the slot was released.
    pub async fn ready(&self) {
        self.shared.ready.notified().await;
    }

    /// Ids of in-flight announcements that must stop now.
    pub fn preemptions(&self) -> watch::Receiver<Option<AnnouncementId>> {
        self.shared.preempt.subscribe()
    }

    pub fn in_flight(&self) -> Option<AnnouncementId> {
        self.core().in_flight()
    }

    pub fn pending(&self) -> usize {
        self.core().pending()
    }

    pub fn stats(&self) -> ArbiterStats {
        self.core().stats().clone()
    }
}
