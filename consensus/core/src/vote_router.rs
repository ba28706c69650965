//! Vote routing (spec.md §4.2): maps an incoming vote's hashes onto the
//! live elections that contest them, and classifies the rest as `replay`
//! or `indeterminate`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use lattice_consensus_tracing::emit;

use crate::recently_confirmed::RecentlyConfirmed;
use crate::vote::{Account, Amount, BlockHash, QualifiedRoot, Timestamp, VoteCode, VoteSource};
use crate::vote_cache::VoteCache;
use crate::vote_index::InsertResult;

/// Anything that can accept a single (representative, timestamp, hash)
/// observation on behalf of a live election. `active_elections` registers
/// one of these per hash it contests; the router never needs to know the
/// concrete `Election<B>` type behind it.
pub trait VoteTarget: Send + Sync {
    fn root(&self) -> QualifiedRoot;
    fn vote(
        &self,
        representative: Account,
        timestamp: Timestamp,
        hash: BlockHash,
        weight: Amount,
        quorum_delta: Amount,
    ) -> InsertResult;
}

#[allow(dead_code)]
struct VoteProcessed<'a> {
    representative: &'a str,
    hash: &'a str,
    code: &'static str,
}

/// The routing table plus the two auxiliary lookups needed to classify a
/// hash that has no live election (spec.md §4.2 step 2).
pub struct VoteRouter {
    table: Mutex<HashMap<BlockHash, Weak<dyn VoteTarget>>>,
    recently_confirmed: RecentlyConfirmed,
    vote_cache: VoteCache,
}

impl VoteRouter {
    pub fn new(recently_confirmed: RecentlyConfirmed, vote_cache: VoteCache) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            recently_confirmed,
            vote_cache,
        }
    }

    /// Register a hash as contested by `target`. Called by the active
    /// elections container whenever an election starts tracking a new
    /// block (including forks of an existing root).
    pub fn connect(&self, hash: BlockHash, target: &Arc<dyn VoteTarget>) {
        self.table
            .lock()
            .expect("vote router table poisoned")
            .insert(hash, Arc::downgrade(target));
    }

    pub fn disconnect(&self, hash: &BlockHash) {
        self.table
            .lock()
            .expect("vote router table poisoned")
            .remove(hash);
    }

    pub fn size(&self) -> usize {
        self.table.lock().expect("vote router table poisoned").len()
    }

    /// spec.md §4.2 "Routing table maintenance": drop entries whose
    /// election has already been dropped without an explicit `disconnect`
    /// (e.g. the container panicked mid-teardown). Ordinary confirmed/
    /// expired elections are disconnected explicitly by
    /// `ActiveElections::finish` before this ever has anything to do.
    pub fn reap_expired(&self) {
        self.table
            .lock()
            .expect("vote router table poisoned")
            .retain(|_, target| target.strong_count() > 0);
    }

    /// spec.md §5 "Vote router cleanup: 1 reaper thread": a fixed-cadence
    /// background pump that periodically sweeps stale weak references.
    pub async fn reaper_loop(self: std::sync::Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.reap_expired();
        }
    }

    /// spec.md §4.2: route every hash in `hashes` (or just `filter_hash`,
    /// if set) to its election, recording a `VoteCode` for each.
    ///
    /// `weight` is the representative's weight as resolved by the caller
    /// (the vote processor) at ingest time; every hash in one vote message
    /// shares the same representative, timestamp and weight.
    pub fn vote(
        &self,
        representative: Account,
        timestamp: Timestamp,
        hashes: &[BlockHash],
        weight: Amount,
        quorum_delta: Amount,
        source: VoteSource,
        filter_hash: Option<BlockHash>,
    ) -> HashMap<BlockHash, VoteCode> {
        let mut results = HashMap::new();

        // spec.md §4.2 step 1: dedup the hashes under consideration.
        let mut seen = std::collections::HashSet::new();
        let candidates: Vec<BlockHash> = match filter_hash {
            Some(h) => vec![h],
            None => hashes.iter().copied().filter(|h| seen.insert(*h)).collect(),
        };

        // Snapshot the routing table under the lock, then release it
        // before calling into any election (spec.md §4.2 step 3).
        let matched: Vec<(BlockHash, Option<Arc<dyn VoteTarget>>)> = {
            let table = self.table.lock().expect("vote router table poisoned");
            candidates
                .iter()
                .map(|hash| (*hash, table.get(hash).and_then(Weak::upgrade)))
                .collect()
        };

        for (hash, target) in matched {
            let code = match target {
                Some(target) => {
                    let insert = target.vote(representative, timestamp, hash, weight, quorum_delta);
                    match insert {
                        InsertResult::Inserted | InsertResult::Updated => VoteCode::Vote,
                        InsertResult::Ignored => VoteCode::Ignored,
                    }
                }
                None => {
                    if self.recently_confirmed.contains(&hash) {
                        VoteCode::Replay
                    } else {
                        VoteCode::Indeterminate
                    }
                }
            };

            if source != VoteSource::Cache {
                self.vote_cache.insert(hash, representative, timestamp, weight);
            }

            emit!(
                VoteProcessed {
                    representative: &representative.to_string(),
                    hash: &hash.to_string(),
                    code: code_name(code),
                }
            );

            results.insert(hash, code);
        }

        results
    }
}

fn code_name(code: VoteCode) -> &'static str {
    match code {
        VoteCode::Invalid => "invalid",
        VoteCode::Replay => "replay",
        VoteCode::Vote => "vote",
        VoteCode::Indeterminate => "indeterminate",
        VoteCode::Ignored => "ignored",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote_cache::VoteCache;

    struct FakeTarget {
        root: QualifiedRoot,
        accept: bool,
    }

    impl VoteTarget for FakeTarget {
        fn root(&self) -> QualifiedRoot {
            self.root
        }

        fn vote(
            &self,
            _representative: Account,
            _timestamp: Timestamp,
            _hash: BlockHash,
            _weight: Amount,
            _quorum_delta: Amount,
        ) -> InsertResult {
            if self.accept {
                InsertResult::Inserted
            } else {
                InsertResult::Ignored
            }
        }
    }

    fn root() -> QualifiedRoot {
        QualifiedRoot {
            root: BlockHash([1; 32]),
            previous: BlockHash([2; 32]),
        }
    }

    #[test]
    fn matched_hash_routes_to_election() {
        let router = VoteRouter::new(RecentlyConfirmed::new(16), VoteCache::new(16));
        let hash = BlockHash([3; 32]);
        let target: Arc<dyn VoteTarget> = Arc::new(FakeTarget {
            root: root(),
            accept: true,
        });
        router.connect(hash, &target);

        let results = router.vote(
            Account([9; 32]),
            10,
            &[hash],
            50,
            67,
            VoteSource::Live,
            None,
        );
        assert_eq!(results.get(&hash), Some(&VoteCode::Vote));
    }

    #[test]
    fn unmatched_confirmed_hash_is_replay() {
        let recently_confirmed = RecentlyConfirmed::new(16);
        let hash = BlockHash([3; 32]);
        recently_confirmed.insert(root(), hash);
        let router = VoteRouter::new(recently_confirmed, VoteCache::new(16));

        let results = router.vote(
            Account([9; 32]),
            10,
            &[hash],
            50,
            67,
            VoteSource::Live,
            None,
        );
        assert_eq!(results.get(&hash), Some(&VoteCode::Replay));
    }

    #[test]
    fn unmatched_unknown_hash_is_indeterminate() {
        let router = VoteRouter::new(RecentlyConfirmed::new(16), VoteCache::new(16));
        let hash = BlockHash([3; 32]);

        let results = router.vote(
            Account([9; 32]),
            10,
            &[hash],
            50,
            67,
            VoteSource::Live,
            None,
        );
        assert_eq!(results.get(&hash), Some(&VoteCode::Indeterminate));
    }

    #[test]
    fn non_cache_source_is_offered_to_vote_cache() {
        let router = VoteRouter::new(RecentlyConfirmed::new(16), VoteCache::new(16));
        let hash = BlockHash([3; 32]);
        router.vote(
            Account([9; 32]),
            10,
            &[hash],
            50,
            67,
            VoteSource::Live,
            None,
        );
        assert!(router.vote_cache.find(&hash).is_some());
    }

    #[test]
    fn cache_sourced_vote_is_not_reoffered() {
        let router = VoteRouter::new(RecentlyConfirmed::new(16), VoteCache::new(16));
        let hash = BlockHash([3; 32]);
        router.vote(
            Account([9; 32]),
            10,
            &[hash],
            50,
            67,
            VoteSource::Cache,
            None,
        );
        assert!(router.vote_cache.find(&hash).is_none());
    }

    #[test]
    fn reap_expired_drops_dead_weak_references() {
        let router = VoteRouter::new(RecentlyConfirmed::new(16), VoteCache::new(16));
        let hash = BlockHash([7; 32]);
        {
            let target: Arc<dyn VoteTarget> = Arc::new(FakeTarget {
                root: root(),
                accept: true,
            });
            router.connect(hash, &target);
        }
        assert_eq!(router.size(), 1);
        router.reap_expired();
        assert_eq!(router.size(), 0);
    }

    #[test]
    fn duplicate_hashes_in_one_vote_are_deduplicated() {
        let router = VoteRouter::new(RecentlyConfirmed::new(16), VoteCache::new(16));
        let hash = BlockHash([3; 32]);
        let results = router.vote(
            Account([9; 32]),
            10,
            &[hash, hash, hash],
            50,
            67,
            VoteSource::Live,
            None,
        );
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn filter_hash_restricts_to_one_hash() {
        let router = VoteRouter::new(RecentlyConfirmed::new(16), VoteCache::new(16));
        let h1 = BlockHash([3; 32]);
        let h2 = BlockHash([4; 32]);
        let results = router.vote(
            Account([9; 32]),
            10,
            &[h1, h2],
            50,
            67,
            VoteSource::Live,
            Some(h1),
        );
        assert_eq!(results.len(), 1);
        assert!(results.contains_key(&h1));
    }
}
