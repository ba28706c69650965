//! Fair, per-source queue (spec.md §4.8): a weighted round-robin
//! multiplexer used wherever the core needs to drain several request
//! streams without starving the lower-priority ones.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;

/// Per-source admission policy: how many items may sit in this source's
/// queue, and how many consecutive items are drained from it per visit of
/// the round-robin cursor.
#[derive(Clone, Copy, Debug)]
pub struct SourceConfig {
    pub max_size: usize,
    pub priority: usize,
}

struct SubQueue<T> {
    items: VecDeque<T>,
    config: SourceConfig,
}

struct Inner<Source, T> {
    order: Vec<Source>,
    queues: HashMap<Source, SubQueue<T>>,
    cursor: usize,
    taken_this_visit: usize,
}

pub struct FairQueue<Source, T> {
    inner: Mutex<Inner<Source, T>>,
}

impl<Source, T> FairQueue<Source, T>
where
    Source: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: Vec::new(),
                queues: HashMap::new(),
                cursor: 0,
                taken_this_visit: 0,
            }),
        }
    }

    /// Register, or re-register, the admission policy for `source`. New
    /// sources join the round-robin rotation in registration order.
    pub fn configure(&self, source: Source, config: SourceConfig) {
        let mut inner = self.inner.lock().expect("fair queue poisoned");
        if let Some(existing) = inner.queues.get_mut(&source) {
            existing.config = config;
        } else {
            inner.order.push(source.clone());
            inner.queues.insert(
                source,
                SubQueue {
                    items: VecDeque::new(),
                    config,
                },
            );
        }
    }

    /// Push one item onto `source`'s queue. Returns `false` if the
    /// source's capacity is exhausted (spec.md §7 "queue overfill": the
    /// caller bumps a stat and drops the item).
    pub fn push(&self, source: Source, item: T) -> bool {
        let mut inner = self.inner.lock().expect("fair queue poisoned");
        let Some(queue) = inner.queues.get_mut(&source) else {
            return false;
        };
        if queue.items.len() >= queue.config.max_size {
            return false;
        }
        queue.items.push_back(item);
        true
    }

    /// Pull the next item in round-robin order, consuming up to
    /// `priority` items from each source before stepping to the next one
    /// (spec.md §4.8, §8 scenario 5).
    pub fn next(&self) -> Option<(Source, T)> {
        let mut inner = self.inner.lock().expect("fair queue poisoned");
        if inner.order.is_empty() {
            return None;
        }

        let mut spins = 0;
        loop {
            if spins > inner.order.len() {
                return None;
            }

            let source = inner.order[inner.cursor].clone();
            let exhausted_turn = {
                let queue = inner.queues.get(&source).expect("registered source");
                inner.taken_this_visit >= queue.config.priority || queue.items.is_empty()
            };

            if exhausted_turn {
                inner.cursor = (inner.cursor + 1) % inner.order.len();
                inner.taken_this_visit = 0;
                spins += 1;
                continue;
            }

            let item = inner
                .queues
                .get_mut(&source)
                .expect("registered source")
                .items
                .pop_front()
                .expect("checked non-empty above");
            inner.taken_this_visit += 1;
            return Some((source, item));
        }
    }

    pub fn len(&self, source: &Source) -> usize {
        self.inner
            .lock()
            .expect("fair queue poisoned")
            .queues
            .get(source)
            .map(|q| q.items.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .lock()
            .expect("fair queue poisoned")
            .queues
            .values()
            .all(|q| q.items.is_empty())
    }

    /// SPEC_FULL.md §C.5: total queued items and number of registered
    /// sources, for an external diagnostics endpoint.
    pub fn container_info(&self) -> Vec<(&'static str, usize)> {
        let inner = self.inner.lock().expect("fair queue poisoned");
        let queued: usize = inner.queues.values().map(|q| q.items.len()).sum();
        vec![("sources", inner.order.len()), ("queued", queued)]
    }

    /// Drop any source whose caller has signalled it is gone (spec.md
    /// §4.8's periodic cleanup of dead channels).
    pub fn retain_sources<F>(&self, mut keep: F)
    where
        F: FnMut(&Source) -> bool,
    {
        let mut inner = self.inner.lock().expect("fair queue poisoned");
        inner.order.retain(|s| keep(s));
        inner.queues.retain(|s, _| keep(s));
        inner.cursor = 0;
        inner.taken_this_visit = 0;
    }
}

impl<Source, T> Default for FairQueue<Source, T>
where
    Source: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
