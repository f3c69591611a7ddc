//! Sliding-window duplicate filter.
//!
//! Maps a [`Fingerprint`] to the time it was accepted. Entries older than
//! the window are purged lazily on every check and periodically by the
//! consumer's cleanup ticker. A hit means an equivalent record was accepted
//! within the trailing window; it is a filter, not an exactness guarantee.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::Fingerprint;

#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    seen: HashMap<Fingerprint, Instant>,
}

impl DedupCache {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Purge expired entries, then report whether `fingerprint` is a
    /// duplicate. A fingerprint that is not a duplicate is recorded at `now`.
    pub fn check_and_insert(&mut self, fingerprint: &Fingerprint, now: Instant) -> bool {
        self.purge(now);
        if self.seen.contains_key(fingerprint) {
            return true;
        }
        self.seen.insert(fingerprint.clone(), now);
        false
    }

    /// Drop entries accepted more than one window before `now`. Returns how
    /// many were dropped.
    pub fn purge(&mut self, now: Instant) -> usize {
        let before = self.seen.len();
        let window = self.window;
        self.seen
            .retain(|_, accepted| now.saturating_duration_since(*accepted) <= window);
        before - self.seen.len()
    }

    #[must_use]
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains_key(fingerprint)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget everything.
    pub fn close(&mut self) {
        self.seen.clear();
    }
}
