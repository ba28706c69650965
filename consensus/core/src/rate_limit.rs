//! A per-key GCRA rate limiter, in the style of an IPLD resolver's gossip
//! limiter: forgets keys after a period of inactivity instead of keeping
//! one state forever.

use std::time::{Duration, Instant};

use gcra::GcraState;
pub use gcra::RateLimit;
use lru_time_cache::LruCache;

pub struct RateLimiter<K> {
    cache: LruCache<K, GcraState>,
}

impl<K> RateLimiter<K>
where
    K: Ord + Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: LruCache::with_expiry_duration(ttl),
        }
    }

    /// Returns `true` if `key` was within `limit`, `false` if it must wait.
    pub fn add(&mut self, limit: &RateLimit, key: K, cost: u32) -> bool {
        self.add_at(limit, key, cost, Instant::now())
    }

    pub fn add_at(&mut self, limit: &RateLimit, key: K, cost: u32, at: Instant) -> bool {
        #[allow(clippy::unwrap_or_default)]
        let state = self.cache.entry(key).or_insert_with(GcraState::default);
        state.check_and_modify_at(limit, at, cost).is_ok()
    }
}
