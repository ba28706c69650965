//! Manual scheduler (spec.md §4.4): a FIFO queue of externally-submitted
//! `(block, optional previous_balance, behavior, confirmation_action)`
//! tuples, inserted without any bucket/priority reasoning.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::election::Behavior;
use crate::vote::Amount;

/// One externally-submitted election request (spec.md §6.2
/// `scheduler.manual.push`). `confirmation_action`, if present, is invoked
/// by the caller once this election confirms — the scheduler itself only
/// carries it through to insertion.
pub struct ManualSubmission<B> {
    pub block: B,
    pub previous_balance: Option<Amount>,
    pub behavior: Behavior,
    pub confirmation_action: Option<Arc<dyn Fn(&B) + Send + Sync>>,
}

pub struct ManualScheduler<B> {
    queue: Mutex<VecDeque<ManualSubmission<B>>>,
}

impl<B> ManualScheduler<B> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// `scheduler.manual.push(block, previous_balance?, behavior,
    /// confirmation_action)` (spec.md §6.2).
    pub fn push(
        &self,
        block: B,
        previous_balance: Option<Amount>,
        behavior: Behavior,
        confirmation_action: Option<Arc<dyn Fn(&B) + Send + Sync>>,
    ) {
        self.queue
            .lock()
            .expect("manual scheduler poisoned")
            .push_back(ManualSubmission {
                block,
                previous_balance,
                behavior,
                confirmation_action,
            });
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("manual scheduler poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One scheduler tick: drain the FIFO one entry at a time, handing
    /// each to the caller for insertion. Unlike the priority/hinted/
    /// optimistic variants there is no per-behavior vacancy gate here —
    /// §4.4's overfill policy is what bounds manual insertion (the pump
    /// evicts the oldest active election first when overfull).
    pub fn tick<I>(&self, mut try_insert: I)
    where
        I: FnMut(ManualSubmission<B>),
    {
        while let Some(submission) = self.queue.lock().expect("manual scheduler poisoned").pop_front()
        {
            try_insert(submission);
        }
    }
}

impl<B> Default for ManualScheduler<B> {
    fn default() -> Self {
        Self::new()
    }
}
