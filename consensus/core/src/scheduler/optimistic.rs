//! Optimistic scheduler (spec.md §4.4): activates accounts whose
//! unconfirmed height exceeds a gap threshold, in a bounded queue that
//! drops the oldest candidate on overflow
//! (`nano/node/optimistic_scheduler.cpp`).

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::vote::Account;

/// `optimistic_gap_threshold`: the original's default is 32 unconfirmed
/// blocks (spec.md §4.4).
pub const DEFAULT_GAP_THRESHOLD: u64 = 32;

pub struct OptimisticScheduler {
    gap_threshold: u64,
    max_size: usize,
    candidates: Mutex<VecDeque<Account>>,
}

impl OptimisticScheduler {
    pub fn new(gap_threshold: u64, max_size: usize) -> Self {
        Self {
            gap_threshold,
            max_size,
            candidates: Mutex::new(VecDeque::new()),
        }
    }

    /// `activate(account, block_count, confirmed_height) -> activated`
    /// (spec.md §4.4). Oldest candidate is dropped on overflow, matching
    /// the original's bounded deque.
    pub fn activate(&self, account: Account, block_count: u64, confirmed_height: u64) -> bool {
        if block_count.saturating_sub(confirmed_height) <= self.gap_threshold {
            return false;
        }
        let mut candidates = self.candidates.lock().expect("optimistic scheduler poisoned");
        candidates.push_back(account);
        if candidates.len() > self.max_size {
            candidates.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.candidates
            .lock()
            .expect("optimistic scheduler poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One scheduler tick (spec.md §4.4): while the optimistic behavior
    /// has vacancy, pop the oldest candidate and hand it to the caller to
    /// load its head block and insert with `behavior=optimistic`.
    pub fn tick<V, L, I>(&self, has_vacancy: V, mut load_head: L, mut try_insert: I)
    where
        V: Fn() -> bool,
        L: FnMut(Account) -> Option<(crate::vote::BlockHash, bool)>,
        I: FnMut(Account, crate::vote::BlockHash),
    {
        while has_vacancy() {
            let Some(account) = self
                .candidates
                .lock()
                .expect("optimistic scheduler poisoned")
                .pop_front()
            else {
                break;
            };
            if let Some((hash, already_confirmed)) = load_head(account) {
                if !already_confirmed {
                    try_insert(account, hash);
                }
            }
        }
    }
}
