//! A process-wide stats sink, passed by reference to every component at
//! construction (spec.md §9: "never accessed through statics").

use std::collections::HashMap;
use std::sync::Mutex;

/// Counters bumped by recoverable, expected-but-noteworthy outcomes
/// (spec.md §7): `rollback_failed`, `non_votable`, `no_targets`,
/// `vote_spacing_suppressed`, `queue_overfill`, and similar.
pub trait Stats: Send + Sync {
    fn increment(&self, counter: &'static str);
}

/// A stats sink that discards everything. Used where no observability is
/// wired up (e.g. one-off tests of a single component).
#[derive(Debug, Default)]
pub struct NullStats;

impl Stats for NullStats {
    fn increment(&self, _counter: &'static str) {}
}

/// An in-memory counting sink, for tests that assert on stat counts.
#[derive(Debug, Default)]
pub struct CountingStats {
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl CountingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, counter: &'static str) -> u64 {
        self.counts.lock().unwrap().get(counter).copied().unwrap_or(0)
    }
}

impl Stats for CountingStats {
    fn increment(&self, counter: &'static str) {
        *self.counts.lock().unwrap().entry(counter).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_increments() {
        let stats = CountingStats::new();
        stats.increment("non_votable");
        stats.increment("non_votable");
        stats.increment("no_targets");
        assert_eq!(stats.count("non_votable"), 2);
        assert_eq!(stats.count("no_targets"), 1);
        assert_eq!(stats.count("rollback_failed"), 0);
    }
}
