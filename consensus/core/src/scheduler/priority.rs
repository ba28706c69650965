//! Priority scheduler (spec.md §4.4): per-bucket queue ordered by minimum
//! observed balance, oldest-modified account first within a bucket.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::bucket::{Bucketing, BucketIndex};
use crate::vote::{Account, Amount, BlockHash, Timestamp};

#[derive(Clone, Copy, Debug)]
pub struct PrioritySubmission {
    pub account: Account,
    pub priority_balance: Amount,
    pub timestamp: Timestamp,
}

pub struct PriorityScheduler {
    bucketing: Bucketing,
    queues: Mutex<HashMap<BucketIndex, BTreeMap<(Timestamp, Account), PrioritySubmission>>>,
}

impl PriorityScheduler {
    pub fn new() -> Self {
        Self {
            bucketing: Bucketing::new(),
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn bucket_of(&self, priority_balance: Amount) -> BucketIndex {
        self.bucketing.index(priority_balance)
    }

    /// `scheduler.priority.activate(account, info) -> {activated, overflow}`
    /// (spec.md §6.2). There is no per-bucket size cap on the queue itself
    /// (that bound lives in `ActiveElections::limit`), so activation always
    /// succeeds; `overflow` is reserved for a future de-duplication policy.
    pub fn activate(&self, account: Account, priority_balance: Amount, timestamp: Timestamp) -> bool {
        let bucket = self.bucket_of(priority_balance);
        let mut queues = self.queues.lock().expect("priority scheduler poisoned");
        let submission = PrioritySubmission {
            account,
            priority_balance,
            timestamp,
        };
        queues
            .entry(bucket)
            .or_default()
            .insert((timestamp, account), submission);
        true
    }

    fn pop_top(&self, bucket: BucketIndex) -> Option<PrioritySubmission> {
        let mut queues = self.queues.lock().expect("priority scheduler poisoned");
        let queue = queues.get_mut(&bucket)?;
        let key = *queue.keys().next()?;
        queue.remove(&key)
    }

    pub fn queue_len(&self, bucket: BucketIndex) -> usize {
        self.queues
            .lock()
            .expect("priority scheduler poisoned")
            .get(&bucket)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// One scheduler tick (spec.md §4.4): for every bucket with an
    /// available slot, pop the top account, load its next-to-cement block,
    /// and insert it if its dependents are confirmed.
    pub fn tick<S, L, I>(&self, has_slot: S, mut load_next_block: L, mut try_insert: I)
    where
        S: Fn(BucketIndex) -> bool,
        L: FnMut(Account) -> Option<(BlockHash, bool)>,
        I: FnMut(Account, BucketIndex, Timestamp, BlockHash),
    {
        for bucket in self.bucketing.indices() {
            if !has_slot(bucket) {
                continue;
            }
            let Some(submission) = self.pop_top(bucket) else {
                continue;
            };
            if let Some((hash, dependents_confirmed)) = load_next_block(submission.account) {
                if dependents_confirmed {
                    try_insert(submission.account, bucket, submission.timestamp, hash);
                }
            }
        }
    }
}

impl Default for PriorityScheduler {
    fn default() -> Self {
        Self::new()
    }
}
