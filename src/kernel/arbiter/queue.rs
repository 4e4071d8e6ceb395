use std::cmp::Reverse;

use crate::kernel::event::{DedupKey, Event, Severity};

#[derive(Debug, Clone)]
pub struct Pending {
    /// Submission order at the serialization point.
    pub seq: u64,
    pub key: DedupKey,
    pub event: Event,
}

impl Pending {
    /// Larger is served first: severity, then earliest arrival, then source
    /// priority, then submission order.
    fn service_rank(&self) -> (Severity, Reverse<std::time::Instant>, u8, Reverse<u64>) {
        (
            self.event.severity,
            Reverse(self.event.timestamp),
            self.event.source().rank(),
            Reverse(self.seq),
        )
    }

    /// Smaller is shed first: lowest severity, then oldest.
    fn shed_rank(&self) -> (Severity, std::time::Instant, u64) {
        (self.event.severity, self.event.timestamp, self.seq)
    }
}

/// Bounded pending set. Never blocks: overflow sheds an entry instead.
#[derive(Debug)]
pub struct PendingQueue {
    entries: Vec<Pending>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity + 1), capacity: capacity.max(1) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts and, if over capacity, returns the shed entry (which may be the
    /// one just inserted).
    pub fn push(&mut self, pending: Pending) -> Option<Pending> {
        self.entries.push(pending);
        if self.entries.len() <= self.capacity {
            return None;
        }
        let victim = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.shed_rank())
            .map(|(i, _)| i)?;
        Some(self.entries.swap_remove(victim))
    }

    pub fn pop_next(&mut self) -> Option<Pending> {
        let next = self
            .entries
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| p.service_rank())
            .map(|(i, _)| i)?;
        Some(self.entries.swap_remove(next))
    }

    /// An entry with the same key at equal or higher severity is already waiting.
    pub fn holds_equivalent(&self, key: &DedupKey, severity: Severity) -> bool {
        self.entries.iter().any(|p| &p.key == key && p.event.severity >= severity)
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}
