//! Interfaces consumed from, and exposed to, external collaborators
//! (spec.md §6.1, §6.2): ledger storage, block processing, network
//! transport, wallets, and the confirming set. None of these are
//! implemented here — the core only depends on the trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::election::Behavior;
use crate::vote::{Account, Amount, BlockHash, QualifiedRoot, Signature, VoteMessage};

/// Outcome of handing a block to the block-processing pipeline
/// (spec.md §1: "the core sees only outcomes").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockStatus {
    Progress,
    Fork,
    GapPrevious,
    GapSource,
    Old,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn block_exists(&self, hash: &BlockHash) -> bool;
    async fn account_head(&self, account: &Account) -> Option<BlockHash>;
    async fn block_successor(&self, qualified_root: &QualifiedRoot) -> Option<BlockHash>;
    /// `confirmed.block_exists_or_pruned`.
    async fn confirmed_block_exists_or_pruned(&self, hash: &BlockHash) -> bool;
    /// `confirmed.account_balance`.
    async fn confirmed_account_balance(&self, account: &Account) -> Option<Amount>;
    async fn dependents_confirmed(&self, hash: &BlockHash) -> bool;
    /// Returns `Err` on failure (e.g. a cemented successor already exists),
    /// matching spec.md §6.1's "true on failure" inverted into idiomatic
    /// `Result` plumbing.
    async fn rollback(&self, hash: &BlockHash) -> Result<Vec<BlockHash>, RollbackError>;
    fn weight(&self, account: &Account) -> Amount;
    fn cemented_count(&self) -> u64;
    /// Atomic check-and-put against the `final_votes(root)` slot
    /// (spec.md §4.6 step 3, §8 "Final-vote table conflict"): succeeds if
    /// the slot is empty or already holds `hash`.
    async fn final_votes_check_and_put(&self, root: QualifiedRoot, hash: BlockHash) -> bool;
}

#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("rollback failed: successor already cemented")]
pub struct RollbackError;

/// Current and trended online representative weight (spec.md §6.1).
pub trait OnlineReps: Send + Sync {
    /// The online quorum delta (`Δ`), used directly by the election state
    /// machine at every vote ingestion.
    fn delta(&self) -> Amount;
    fn trended(&self) -> Amount;
}

#[async_trait]
pub trait BlockProcessor: Send + Sync {
    async fn add(&self, hash: BlockHash, source: BlockSource);
    async fn add_blocking(&self, hash: BlockHash, source: BlockSource) -> Option<BlockStatus>;
    fn force(&self, hash: BlockHash);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockSource {
    Live,
    Bootstrap,
    Local,
    Forced,
}

/// Whether a send may be silently dropped under backpressure
/// (`nano/node/bandwidth_limiter.{hpp,cpp}`; spec.md §6.1 `drop_policy`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DropPolicy {
    CanDrop,
    NoLimiterDrop,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BandwidthLimitType {
    Vote,
    Block,
    ConfirmReq,
}

#[derive(Clone, Debug)]
pub enum OutboundMessage {
    Vote(VoteMessage),
    Block(BlockHash),
    ConfirmReq(Vec<(BlockHash, QualifiedRoot)>),
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn is_full(&self) -> bool;
    fn representative(&self) -> Option<Account>;
    /// Whether this peer has already voted final for the given hash
    /// (spec.md §4.7: the solicitor skips reps who have).
    fn voted_final(&self, hash: &BlockHash) -> bool;
    async fn send(
        &self,
        message: OutboundMessage,
        drop_policy: DropPolicy,
        bandwidth: BandwidthLimitType,
    ) -> bool;
}

#[async_trait]
pub trait Network: Send + Sync {
    async fn flood_vote(&self, vote: VoteMessage, fanout_ratio: f64);
    async fn flood_vote_pr(&self, vote: VoteMessage);
    async fn flood_message(
        &self,
        message: OutboundMessage,
        fanout_ratio: f64,
        drop_policy: DropPolicy,
    );
    /// A snapshot of currently known representative channels, used by the
    /// confirmation solicitor to build its per-cycle shuffled list
    /// (spec.md §4.7).
    fn representative_channels(&self) -> Vec<Arc<dyn Channel>>;
}

pub trait Wallet: Send + Sync {
    fn representatives(&self) -> Vec<Account>;
    fn sign(&self, representative: &Account, message_hash: &[u8; 32]) -> Option<Signature>;
}

pub trait ConfirmingSet: Send + Sync {
    fn add(&self, hash: BlockHash);
    fn exists(&self, hash: &BlockHash) -> bool;
}

/// A confirming set that drops everything handed to it; the default when no
/// cementing pipeline is wired up (tests, standalone election-state checks).
pub struct NullConfirmingSet;
impl ConfirmingSet for NullConfirmingSet {
    fn add(&self, _hash: BlockHash) {}
    fn exists(&self, _hash: &BlockHash) -> bool {
        false
    }
}

/// Accepts `(root, hash)` vote candidates from active elections
/// (spec.md §4.6 data-flow step 4/5, §4.1 "broadcast vote"). `VoteGenerator`
/// is the real implementation; kept as a trait here so `ActiveElections`
/// doesn't need a full generator (ledger/wallet/network) to be exercised.
pub trait VoteBroadcaster: Send + Sync {
    fn add(&self, root: QualifiedRoot, hash: BlockHash);
}

/// A vote broadcaster that drops every candidate; the default when local
/// voting is disabled (no representatives in this node's wallet).
pub struct NullVoteBroadcaster;
impl VoteBroadcaster for NullVoteBroadcaster {
    fn add(&self, _root: QualifiedRoot, _hash: BlockHash) {}
}

/// A network that reaches nobody; the default for tests that exercise the
/// active-elections pump without a real transport.
pub struct NullNetwork;
#[async_trait]
impl Network for NullNetwork {
    async fn flood_vote(&self, _vote: VoteMessage, _fanout_ratio: f64) {}
    async fn flood_vote_pr(&self, _vote: VoteMessage) {}
    async fn flood_message(
        &self,
        _message: OutboundMessage,
        _fanout_ratio: f64,
        _drop_policy: DropPolicy,
    ) {
    }
    fn representative_channels(&self) -> Vec<Arc<dyn Channel>> {
        Vec::new()
    }
}

/// `election.trace` (spec.md §7): a hook fired from the lifecycle tick,
/// standing in for `confirmation_action` (spec.md §4.1).
pub trait ElectionObserver: Send + Sync {
    fn on_started(&self, _root: QualifiedRoot, _behavior: Behavior) {}
    fn on_confirmed(&self, _root: QualifiedRoot, _winner: BlockHash) {}
    fn on_expired(&self, _root: QualifiedRoot) {}
    fn on_cancelled(&self, _root: QualifiedRoot) {}
}

/// An observer that does nothing; the default when no diagnostics
/// collector is wired up.
pub struct NullElectionObserver;
impl ElectionObserver for NullElectionObserver {}
