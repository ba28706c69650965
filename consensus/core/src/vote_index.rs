//! Per-election vote store (spec.md §3.2): a set of `Vote`s indexed by
//! representative (unique), with incrementally-maintained per-hash tallies
//! standing in for the hash and timestamp secondary indices — the container
//! only ever needs "weight for hash" and "final weight for hash" lookups,
//! not arbitrary range scans by timestamp, so those are what is kept
//! up to date on every mutation rather than recomputed by scanning.

use std::collections::HashMap;

use crate::vote::{Account, Amount, BlockHash, Vote};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InsertResult {
    Inserted,
    Updated,
    Ignored,
}

#[derive(Default)]
pub struct VoteIndex {
    /// The one retained vote per representative (spec.md invariant #1).
    by_representative: HashMap<Account, Vote>,
    /// Summed weight of every vote currently pointing at a hash.
    tally: HashMap<BlockHash, Amount>,
    /// Summed weight of only the final (sentinel-timestamp) votes pointing
    /// at a hash.
    final_tally: HashMap<BlockHash, Amount>,
}

impl VoteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_or_update(&mut self, vote: Vote) -> InsertResult {
        match self.by_representative.get(&vote.representative).copied() {
            None => {
                self.add_to_tallies(&vote);
                self.by_representative.insert(vote.representative, vote);
                InsertResult::Inserted
            }
            Some(existing) => {
                if vote.timestamp > existing.timestamp {
                    self.remove_from_tallies(&existing);
                    self.add_to_tallies(&vote);
                    self.by_representative.insert(vote.representative, vote);
                    InsertResult::Updated
                } else {
                    InsertResult::Ignored
                }
            }
        }
    }

    fn add_to_tallies(&mut self, vote: &Vote) {
        *self.tally.entry(vote.hash).or_default() += vote.weight;
        if vote.is_final() {
            *self.final_tally.entry(vote.hash).or_default() += vote.weight;
        }
    }

    fn remove_from_tallies(&mut self, vote: &Vote) {
        if let Some(w) = self.tally.get_mut(&vote.hash) {
            *w -= vote.weight;
            if *w == 0 {
                self.tally.remove(&vote.hash);
            }
        }
        if vote.is_final() {
            if let Some(w) = self.final_tally.get_mut(&vote.hash) {
                *w -= vote.weight;
                if *w == 0 {
                    self.final_tally.remove(&vote.hash);
                }
            }
        }
    }

    /// Hash with the greatest summed weight; ties broken by the numerically
    /// smallest hash (spec.md §3.2).
    pub fn leader(&self) -> Option<BlockHash> {
        Self::leading_hash(&self.tally)
    }

    fn final_leader(&self) -> Option<BlockHash> {
        Self::leading_hash(&self.final_tally)
    }

    fn leading_hash(tally: &HashMap<BlockHash, Amount>) -> Option<BlockHash> {
        tally
            .iter()
            .max_by(|(hash_a, weight_a), (hash_b, weight_b)| {
                weight_a.cmp(weight_b).then(hash_b.cmp(hash_a))
            })
            .map(|(hash, _)| *hash)
    }

    /// Some hash whose summed weight (final or not) is at least `delta`.
    pub fn reached_quorum(&self, delta: Amount) -> Option<BlockHash> {
        assert!(delta > 0, "quorum delta must be non-zero");
        let leader = self.leader()?;
        let weight = self.tally.get(&leader).copied().unwrap_or_default();
        (weight >= delta).then_some(leader)
    }

    /// Some hash whose summed *final* vote weight is at least `delta`.
    pub fn reached_final_quorum(&self, delta: Amount) -> Option<BlockHash> {
        assert!(delta > 0, "quorum delta must be non-zero");
        let leader = self.final_leader()?;
        let weight = self.final_tally.get(&leader).copied().unwrap_or_default();
        (weight >= delta).then_some(leader)
    }

    pub fn tally(&self, hash: &BlockHash) -> Amount {
        self.tally.get(hash).copied().unwrap_or_default()
    }

    pub fn final_tally(&self, hash: &BlockHash) -> Amount {
        self.final_tally.get(hash).copied().unwrap_or_default()
    }

    pub fn participants(&self) -> impl Iterator<Item = &Account> {
        self.by_representative.keys()
    }

    pub fn size(&self) -> usize {
        self.by_representative.len()
    }

    pub fn total_weight(&self) -> Amount {
        self.tally.values().sum()
    }

    pub fn vote_of(&self, representative: &Account) -> Option<Vote> {
        self.by_representative.get(representative).copied()
    }

    pub fn container_info(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("by_representative", self.by_representative.len()),
            ("tally", self.tally.len()),
            ("final_tally", self.final_tally.len()),
        ]
    }
}
