//! A small `Arc<Mutex<LruCache>>` wrapper, in the manner of
//! `fendermint_eth_api::cache::Cache` — every reader needs a `&mut`
//! borrow of the underlying `LruCache` because even a hit reorders the
//! internal list, so the lock is taken for both reads and writes.

use std::sync::{Arc, Mutex};

use lru_time_cache::LruCache;

#[derive(Clone)]
pub struct Cache<K, V> {
    cache: Arc<Mutex<LruCache<K, V>>>,
}

impl<K, V> Cache<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(LruCache::with_capacity(capacity))),
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.with(|c| c.insert(key, value))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.with(|c| c.get(key).cloned())
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.with(|c| c.remove(key))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.with(|c| c.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.with(|c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn with<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut LruCache<K, V>) -> T,
    {
        let mut guard = self.cache.lock().expect("cache poisoned");
        f(&mut guard)
    }
}
