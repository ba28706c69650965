//! Bounded backlog (spec.md §4.5): rolls back the oldest unconfirmed work
//! once the pool of blocks above the confirmed frontier exceeds a bound.

use std::collections::HashMap;
use std::sync::Mutex;

use lattice_consensus_settings::BacklogSettings;

use crate::bucket::BucketIndex;
use crate::vote::{Account, BlockHash, Timestamp};

#[derive(Clone, Copy, Debug)]
pub struct BacklogEntry {
    pub bucket: BucketIndex,
    pub priority_timestamp: Timestamp,
    pub head_hash: BlockHash,
    pub unconfirmed_count: u64,
}

pub struct BoundedBacklog {
    entries: Mutex<HashMap<Account, BacklogEntry>>,
    settings: BacklogSettings,
}

impl BoundedBacklog {
    pub fn new(settings: BacklogSettings) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            settings,
        }
    }

    /// spec.md §4.5 `update(account)`: called on every ledger
    /// progress/rollback. The caller has already decided `head` differs
    /// from the confirmed frontier; supplying `None` erases the account
    /// (head caught up to the frontier).
    pub fn update(&self, account: Account, entry: Option<BacklogEntry>) {
        let mut entries = self.entries.lock().expect("backlog poisoned");
        match entry {
            Some(entry) => {
                entries.insert(account, entry);
            }
            None => {
                entries.remove(&account);
            }
        }
    }

    pub fn backlog_size(&self) -> u64 {
        self.entries
            .lock()
            .expect("backlog poisoned")
            .values()
            .map(|e| e.unconfirmed_count)
            .sum()
    }

    pub fn bucket_unconfirmed(&self, bucket: BucketIndex) -> u64 {
        self.entries
            .lock()
            .expect("backlog poisoned")
            .values()
            .filter(|e| e.bucket == bucket)
            .map(|e| e.unconfirmed_count)
            .sum()
    }

    pub fn exceeds_limit(&self) -> bool {
        self.backlog_size() > self.settings.max_backlog as u64
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("backlog poisoned").len()
    }

    /// spec.md §4.5 rollback tick: pick up to `min(backlog_size -
    /// max_backlog, batch_size)` victims from buckets whose unconfirmed
    /// count exceeds `bucket_threshold`, oldest (highest priority
    /// timestamp) first, excluding anything `eligible` rejects (the
    /// caller checks vote cache / router / recently-confirmed / confirming
    /// set membership).
    pub fn select_victims<F>(&self, eligible: F) -> Vec<(Account, BlockHash)>
    where
        F: Fn(&BlockHash) -> bool,
    {
        let backlog_size = self.backlog_size();
        let max_backlog = self.settings.max_backlog as u64;
        if backlog_size <= max_backlog {
            return Vec::new();
        }
        let needed = (backlog_size - max_backlog).min(self.settings.batch_size as u64) as usize;

        let entries = self.entries.lock().expect("backlog poisoned");
        let bucket_counts: HashMap<BucketIndex, u64> = {
            let mut counts = HashMap::new();
            for e in entries.values() {
                *counts.entry(e.bucket).or_insert(0) += e.unconfirmed_count;
            }
            counts
        };

        let mut candidates: Vec<(Account, BacklogEntry)> = entries
            .iter()
            .filter(|(_, e)| {
                bucket_counts.get(&e.bucket).copied().unwrap_or_default()
                    > self.settings.bucket_threshold as u64
            })
            .filter(|(_, e)| eligible(&e.head_hash))
            .map(|(account, e)| (*account, *e))
            .collect();

        // Oldest-first under this scheme means highest priority timestamp
        // first: a larger timestamp marks work that has sat unconfirmed
        // the longest relative to the rest of its (full) bucket.
        candidates.sort_by(|a, b| b.1.priority_timestamp.cmp(&a.1.priority_timestamp));
        candidates.truncate(needed);

        candidates
            .into_iter()
            .map(|(account, e)| (account, e.head_hash))
            .collect()
    }

    /// Remove an entry after its block has been rolled back and the
    /// account's new head recomputed by the caller.
    pub fn remove(&self, account: &Account) {
        self.entries.lock().expect("backlog poisoned").remove(account);
    }

    /// SPEC_FULL.md §C.5: account count and total unconfirmed weight, for
    /// an external diagnostics endpoint.
    pub fn container_info(&self) -> Vec<(&'static str, usize)> {
        let entries = self.entries.lock().expect("backlog poisoned");
        vec![
            ("accounts", entries.len()),
            ("unconfirmed", entries.values().map(|e| e.unconfirmed_count).sum::<u64>() as usize),
        ]
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
    fn scenario_four_backlog_rollback() {
        // spec.md §8 scenario 4.
        let settings = BacklogSettings {
            max_backlog: 10,
            bucket_threshold: 5,
            batch_size: 128,
        };
        let backlog = BoundedBacklog::new(settings);

        for ts in 1u64..=20 {
            backlog.update(
                account(ts as u8),
                Some(BacklogEntry {
                    bucket: 3,
                    priority_timestamp: ts,
                    head_hash: hash(ts as u8),
                    unconfirmed_count: 1,
                }),
            );
        }
        assert_eq!(backlog.backlog_size(), 20);

        let victims = backlog.select_victims(|_| true);
        assert_eq!(victims.len(), 10);
        let mut timestamps: Vec<u64> = victims
            .iter()
            .map(|(account, _)| account.0[0] as u64)
            .collect();
        timestamps.sort_unstable();
        assert_eq!(timestamps, (11..=20).collect::<Vec<_>>());

        for (account, _) in &victims {
            backlog.remove(account);
        }
        assert_eq!(backlog.backlog_size(), 10);
    }

    #[test]
    fn protected_hashes_are_not_selected() {
        let settings = BacklogSettings {
            max_backlog: 0,
            bucket_threshold: 0,
            batch_size: 128,
        };
        let backlog = BoundedBacklog::new(settings);
        backlog.update(
            account(1),
            Some(BacklogEntry {
                bucket: 0,
                priority_timestamp: 1,
                head_hash: hash(1),
                unconfirmed_count: 1,
            }),
        );
        let protected = hash(1);
        let victims = backlog.select_victims(|h| *h != protected);
        assert!(victims.is_empty());
    }

    #[test]
    fn below_threshold_selects_nothing() {
        let settings = BacklogSettings {
            max_backlog: 100,
            bucket_threshold: 5,
            batch_size: 128,
        };
        let backlog = BoundedBacklog::new(settings);
        backlog.update(
            account(1),
            Some(BacklogEntry {
                bucket: 0,
                priority_timestamp: 1,
                head_hash: hash(1),
                unconfirmed_count: 1,
            }),
        );
        assert!(backlog.select_victims(|_| true).is_empty());
    }
}
