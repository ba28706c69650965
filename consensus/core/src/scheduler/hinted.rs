//! Hinted scheduler (spec.md §4.4): sources candidates from the vote
//! cache, activating hashes whose cached vote weight already reaches
//! non-final quorum.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::vote::{Amount, BlockHash};
use crate::vote_cache::VoteCache;

/// Minimum number of distinct voters an `inactive_cache_entry` needs
/// before it is even considered, mirroring the original's
/// `election_start_voters_min` guard against a single large voter
/// triggering a hint on its own weight alone (grounded in
/// `nano/node/election_hinting.cpp`'s `cache_predicate`). See DESIGN.md.
pub const ELECTION_START_VOTERS_MIN: usize = 3;

pub struct HintedScheduler {
    vote_cache: VoteCache,
    queue: Mutex<VecDeque<BlockHash>>,
}

impl HintedScheduler {
    pub fn new(vote_cache: VoteCache) -> Self {
        Self {
            vote_cache,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Called whenever the vote router offers a freshly-cached vote
    /// (spec.md §4.2 step 4): if the hash's cached tally now reaches
    /// `quorum_delta` with enough distinct voters, queue it for
    /// activation.
    pub fn notify(&self, hash: BlockHash, quorum_delta: Amount) {
        let Some(entry) = self.vote_cache.find(&hash) else {
            return;
        };
        if entry.voters.len() >= ELECTION_START_VOTERS_MIN && entry.tally >= quorum_delta {
            let mut queue = self.queue.lock().expect("hinted scheduler poisoned");
            if !queue.contains(&hash) {
                queue.push_back(hash);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("hinted scheduler poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One scheduler tick (spec.md §4.4): while the hinted behavior has
    /// vacancy, pop the highest-tallied queued hash and hand it to the
    /// caller to load the block and insert.
    pub fn tick<V, L, I>(&self, has_vacancy: V, mut load_block: L, mut try_insert: I)
    where
        V: Fn() -> bool,
        L: FnMut(&BlockHash) -> Option<bool>,
        I: FnMut(BlockHash),
    {
        while has_vacancy() {
            let Some(hash) = self.queue.lock().expect("hinted scheduler poisoned").pop_front()
            else {
                break;
            };
            match load_block(&hash) {
                Some(already_confirmed) if !already_confirmed => try_insert(hash),
                _ => {}
            }
        }
    }
}
