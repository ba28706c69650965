//! Vote spacing (spec.md §4.6 step 1, §8 idempotence property): suppresses
//! re-voting for a root within `voting.delay` unless the candidate hash is
//! unchanged.

use std::time::{Duration, Instant};

use crate::lru::Cache;
use crate::vote::{BlockHash, QualifiedRoot};

#[derive(Clone)]
pub struct VoteSpacing {
    delay: Duration,
    last: Cache<QualifiedRoot, (BlockHash, Instant)>,
}

impl VoteSpacing {
    pub fn new(delay: Duration, capacity: usize) -> Self {
        Self {
            delay,
            last: Cache::new(capacity),
        }
    }

    /// Record that we just voted for `hash` on `root`.
    pub fn flag(&self, root: QualifiedRoot, hash: BlockHash, now: Instant) {
        self.last.insert(root, (hash, now));
    }

    /// Whether `(root, hash)` may be voted on right now.
    pub fn votable(&self, root: QualifiedRoot, hash: BlockHash, now: Instant) -> bool {
        match self.last.get(&root) {
            None => true,
            Some((last_hash, last_time)) => {
                hash == last_hash || now.duration_since(last_time) >= self.delay
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> QualifiedRoot {
        QualifiedRoot {
            root: BlockHash([1; 32]),
            previous: BlockHash([2; 32]),
        }
    }

    #[test]
    fn same_hash_is_always_votable_within_window() {
        let spacing = VoteSpacing::new(Duration::from_secs(30), 16);
        let r = root();
        let h = BlockHash([3; 32]);
        let t0 = Instant::now();
        spacing.flag(r, h, t0);
        assert!(spacing.votable(r, h, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn different_hash_is_suppressed_within_window() {
        let spacing = VoteSpacing::new(Duration::from_secs(30), 16);
        let r = root();
        let h1 = BlockHash([3; 32]);
        let h2 = BlockHash([4; 32]);
        let t0 = Instant::now();
        spacing.flag(r, h1, t0);
        assert!(!spacing.votable(r, h2, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn different_hash_is_votable_after_window_elapses() {
        let spacing = VoteSpacing::new(Duration::from_secs(30), 16);
        let r = root();
        let h1 = BlockHash([3; 32]);
        let h2 = BlockHash([4; 32]);
        let t0 = Instant::now();
        spacing.flag(r, h1, t0);
        assert!(spacing.votable(r, h2, t0 + Duration::from_secs(31)));
    }
}
