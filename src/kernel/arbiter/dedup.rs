use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::kernel::event::{DedupKey, Severity};

#[derive(Debug, Clone, Copy)]
struct LastAnnounced {
    severity: Severity,
    at: Instant,
}

/// Last announcement per (source, bucket). The only long-lived mutable state
/// in the core.
#[derive(Debug)]
pub struct DedupState {
    interval: Duration,
    last: HashMap<DedupKey, LastAnnounced>,
}

impl DedupState {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: HashMap::new() }
    }

    /// Suppress when the key was announced less than `interval` before `at`,
    /// unless `severity` is strictly higher than that announcement.
    pub fn should_suppress(&self, key: &DedupKey, severity: Severity, at: Instant) -> bool {
        match self.last.get(key) {
            Some(last) => {
                at.saturating_duration_since(last.at) < self.interval && severity <= last.severity
            }
            None => false,
        }
    }

    pub fn record(&mut self, key: DedupKey, severity: Severity, at: Instant) {
        self.last.insert(key, LastAnnounced { severity, at });
        // Expired keys can never suppress again.
        let interval = self.interval;
        self.last.retain(|_, l| at.saturating_duration_since(l.at) < interval);
    }

    /// Drops the record for `key`, so its next occurrence is spoken.
    pub fn forget(&mut self, key: &DedupKey) -> bool {
        self.last.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
