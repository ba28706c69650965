//! A bounded LRU of confirmed `(qualified_root, hash)` pairs (spec.md §3.4),
//! used by the vote router to distinguish `replay` from `indeterminate`
//! once an election has been torn down.

use crate::lru::Cache;
use crate::vote::{BlockHash, QualifiedRoot};

#[derive(Clone)]
pub struct RecentlyConfirmed {
    by_hash: Cache<BlockHash, QualifiedRoot>,
}

impl RecentlyConfirmed {
    pub fn new(capacity: usize) -> Self {
        Self {
            by_hash: Cache::new(capacity),
        }
    }

    pub fn insert(&self, root: QualifiedRoot, hash: BlockHash) {
        self.by_hash.insert(hash, root);
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.by_hash.contains(hash)
    }

    pub fn root_of(&self, hash: &BlockHash) -> Option<QualifiedRoot> {
        self.by_hash.get(hash)
    }

    pub fn size(&self) -> usize {
        self.by_hash.len()
    }

    pub fn container_info(&self) -> Vec<(&'static str, usize)> {
        vec![("by_hash", self.by_hash.len())]
    }
}
