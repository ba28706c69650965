//! Vote cache (spec.md §3.6): votes for hashes that have no live election
//! yet, kept around so a newly-created election can be seeded instead of
//! waiting for the representative to resend.

use crate::vote::{Account, Amount, BlockHash, Timestamp, TIMESTAMP_SENTINEL};
use crate::lru::Cache;

#[derive(Clone, Default)]
struct Entry {
    voters: Vec<(Account, Timestamp, Amount)>,
    tally: Amount,
    final_tally: Amount,
}

impl Entry {
    fn insert(&mut self, representative: Account, timestamp: Timestamp, weight: Amount) -> bool {
        if let Some(slot) = self
            .voters
            .iter_mut()
            .find(|(acct, _, _)| *acct == representative)
        {
            if timestamp <= slot.1 {
                return false;
            }
            let was_final = slot.1 == TIMESTAMP_SENTINEL;
            self.tally -= slot.2;
            if was_final {
                self.final_tally -= slot.2;
            }
            *slot = (representative, timestamp, weight);
        } else {
            self.voters.push((representative, timestamp, weight));
        }
        self.tally += weight;
        if timestamp == TIMESTAMP_SENTINEL {
            self.final_tally += weight;
        }
        true
    }
}

/// A point-in-time snapshot of the votes cached for one hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedEntry {
    pub voters: Vec<(Account, Timestamp, Amount)>,
    pub tally: Amount,
    pub final_tally: Amount,
}

#[derive(Clone)]
pub struct VoteCache {
    entries: Cache<BlockHash, Entry>,
}

impl VoteCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity),
        }
    }

    /// Record one (representative, timestamp, weight) observation for
    /// `hash`. Returns `false` if it was stale (spec.md §3.2 ordering
    /// semantics apply here too, since the cache stores the same shape of
    /// fact the vote index does).
    pub fn insert(
        &self,
        hash: BlockHash,
        representative: Account,
        timestamp: Timestamp,
        weight: Amount,
    ) -> bool {
        self.entries.with(|cache| {
            let mut entry = cache.get(&hash).cloned().unwrap_or_default();
            let inserted = entry.insert(representative, timestamp, weight);
            cache.insert(hash, entry);
            inserted
        })
    }

    pub fn find(&self, hash: &BlockHash) -> Option<CachedEntry> {
        self.entries.get(hash).map(|e| CachedEntry {
            voters: e.voters,
            tally: e.tally,
            final_tally: e.final_tally,
        })
    }

    pub fn erase(&self, hash: &BlockHash) {
        self.entries.remove(hash);
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn container_info(&self) -> Vec<(&'static str, usize)> {
        vec![("entries", self.entries.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> Account {
        Account([byte; 32])
    }

    fn hash(byte: u8) -> BlockHash {
        BlockHash([byte; 32])
    }

    #[test]
    fn accumulates_weight_across_inserts() {
        let cache = VoteCache::new(16);
        let h = hash(1);
        assert!(cache.insert(h, account(1), 10, 50));
        assert!(cache.insert(h, account(2), 10, 30));
        let entry = cache.find(&h).unwrap();
        assert_eq!(entry.tally, 80);
        assert_eq!(entry.final_tally, 0);
    }

    #[test]
    fn stale_observation_is_rejected() {
        let cache = VoteCache::new(16);
        let h = hash(1);
        cache.insert(h, account(1), 10, 50);
        assert!(!cache.insert(h, account(1), 5, 999));
        assert_eq!(cache.find(&h).unwrap().tally, 50);
    }

    #[test]
    fn final_votes_tracked_separately() {
        let cache = VoteCache::new(16);
        let h = hash(1);
        cache.insert(h, account(1), 10, 50);
        cache.insert(h, account(1), TIMESTAMP_SENTINEL, 50);
        let entry = cache.find(&h).unwrap();
        assert_eq!(entry.tally, 50);
        assert_eq!(entry.final_tally, 50);
    }

    #[test]
    fn missing_hash_returns_none() {
        let cache = VoteCache::new(16);
        assert!(cache.find(&hash(9)).is_none());
    }
}
