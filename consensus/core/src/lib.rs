//! Election and vote consensus core for a block-lattice node (spec.md §1).
//!
//! This crate owns the per-fork election state machine, the vote router,
//! the bucketed active-elections registry, the four scheduler variants,
//! the bounded backlog controller, the vote generator, the confirmation
//! solicitor, and the fair queue they are all built on. Ledger storage,
//! block processing, network transport, wallets, and configuration
//! loading are external collaborators, consumed here only as traits
//! (`collaborators`).

pub mod active_elections;
pub mod bounded_backlog;
pub mod bucket;
pub mod collaborators;
pub mod confirmation_solicitor;
pub mod election;
pub mod error;
pub mod fair_queue;
pub mod local_vote_history;
mod lru;
pub mod rate_limit;
pub mod recently_confirmed;
pub mod scheduler;
pub mod stats;
pub mod vote;
pub mod vote_cache;
pub mod vote_generator;
pub mod vote_index;
pub mod vote_processor;
pub mod vote_router;
pub mod vote_spacing;

pub use active_elections::{ActiveElections, ElectionEntry, InsertOutcome};
pub use election::{Behavior, ConsensusState, Election, ElectionBlock, ElectionState};
pub use error::Error;
pub use recently_confirmed::RecentlyConfirmed;
pub use vote::{
    Account, Amount, BlockHash, QualifiedRoot, Signature, Timestamp, Vote, VoteCode, VoteMessage,
    VoteSource, TIMESTAMP_SENTINEL,
};
pub use vote_cache::VoteCache;
pub use vote_index::{InsertResult, VoteIndex};
pub use vote_router::{VoteRouter, VoteTarget};
