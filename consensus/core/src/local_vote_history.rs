//! Local vote history (spec.md §3.7): the votes this node has already
//! signed for each `(root, hash)`, kept so we can reply to `confirm_req`
//! without re-signing and so the generator can suppress duplicate work.

use crate::lru::Cache;
use crate::vote::{BlockHash, QualifiedRoot, VoteMessage};

#[derive(Clone, Default)]
struct Entry {
    normal: Option<Vec<VoteMessage>>,
    final_votes: Option<Vec<VoteMessage>>,
}

#[derive(Clone)]
pub struct LocalVoteHistory {
    entries: Cache<(QualifiedRoot, BlockHash), Entry>,
}

impl LocalVoteHistory {
    pub fn new(max_cache: usize) -> Self {
        Self {
            entries: Cache::new(max_cache),
        }
    }

    pub fn record(
        &self,
        root: QualifiedRoot,
        hash: BlockHash,
        is_final: bool,
        votes: Vec<VoteMessage>,
    ) {
        self.entries.with(|cache| {
            let mut entry = cache.get(&(root, hash)).cloned().unwrap_or_default();
            if is_final {
                entry.final_votes = Some(votes);
            } else {
                entry.normal = Some(votes);
            }
            cache.insert((root, hash), entry);
        });
    }

    /// Look up a previously-signed vote for `(root, hash)` with the
    /// requested finality, if we have one cached.
    pub fn find(&self, root: QualifiedRoot, hash: BlockHash, is_final: bool) -> Option<Vec<VoteMessage>> {
        self.entries.get(&(root, hash)).and_then(|entry| {
            if is_final {
                entry.final_votes
            } else {
                entry.normal
            }
        })
    }

    pub fn exists(&self, root: QualifiedRoot, hash: BlockHash, is_final: bool) -> bool {
        self.find(root, hash, is_final).is_some()
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
    use crate::vote::Account;

    fn root() -> QualifiedRoot {
        QualifiedRoot {
            root: BlockHash([1; 32]),
            previous: BlockHash([2; 32]),
        }
    }

    fn vote(timestamp: u64) -> VoteMessage {
        VoteMessage {
            representative: Account([1; 32]),
            timestamp,
            hashes: vec![BlockHash([3; 32])],
            signature: crate::vote::Signature([0; 64]),
        }
    }

    #[test]
    fn records_and_finds_by_finality() {
        let history = LocalVoteHistory::new(8);
        let r = root();
        let h = BlockHash([3; 32]);
        history.record(r, h, false, vec![vote(10)]);
        assert!(history.exists(r, h, false));
        assert!(!history.exists(r, h, true));

        history.record(r, h, true, vec![vote(u64::MAX)]);
        assert!(history.exists(r, h, true));
        // The normal-vote entry is untouched by recording a final vote.
        assert!(history.exists(r, h, false));
    }
}
