//! Vote generator, normal and final variants (spec.md §4.6): turns
//! `(root, hash)` candidates into signed, batched, rate-paced outgoing
//! votes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use lattice_consensus_settings::VotingSettings;

use crate::collaborators::{
    BandwidthLimitType, Channel, DropPolicy, Ledger, Network, OutboundMessage, VoteBroadcaster, Wallet,
};
use crate::local_vote_history::LocalVoteHistory;
use crate::stats::Stats;
use crate::vote::{BlockHash, QualifiedRoot, Timestamp, VoteMessage, TIMESTAMP_SENTINEL};
use crate::vote_spacing::VoteSpacing;

/// One batch of `(root, hash)` candidates submitted together; every entry
/// shares the same finality (spec.md §4.6: normal and final are separate
/// pipelines with their own spacing history and candidate streams).
#[derive(Clone, Copy, Debug)]
pub struct Candidate {
    pub root: QualifiedRoot,
    pub hash: BlockHash,
}

pub struct VoteGenerator {
    ledger: Arc<dyn Ledger>,
    wallet: Arc<dyn Wallet>,
    network: Arc<dyn Network>,
    stats: Arc<dyn Stats>,
    history: LocalVoteHistory,
    spacing: VoteSpacing,
    settings: VotingSettings,
    is_final: bool,
    queue: Mutex<VecDeque<Candidate>>,
    notify: tokio::sync::Notify,
}

impl VoteGenerator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        wallet: Arc<dyn Wallet>,
        network: Arc<dyn Network>,
        stats: Arc<dyn Stats>,
        settings: VotingSettings,
        is_final: bool,
    ) -> Self {
        let max_cache = settings.max_cache;
        let delay = settings.vote_spacing_delay;
        Self {
            ledger,
            wallet,
            network,
            stats,
            history: LocalVoteHistory::new(max_cache),
            spacing: VoteSpacing::new(delay, max_cache),
            settings,
            is_final,
            queue: Mutex::new(VecDeque::new()),
            notify: tokio::sync::Notify::new(),
        }
    }

    /// `generator.add(root, hash)` (spec.md §6.2).
    pub fn add(&self, root: QualifiedRoot, hash: BlockHash) {
        self.queue
            .lock()
            .expect("vote generator queue poisoned")
            .push_back(Candidate { root, hash });
        self.notify.notify_one();
    }

    /// Background batching pump (spec.md §4.6 step 4, §5 "suspension
    /// points"): wakes on a new candidate or the batch delay, whichever
    /// comes first, then drains up to `confirm_ack_hashes_max` candidates.
    pub async fn run(self: Arc<Self>) {
        loop {
            let wait_for_notify = self.notify.notified();
            tokio::select! {
                _ = wait_for_notify => {}
                _ = tokio::time::sleep(self.settings.vote_generator_delay) => {}
            }

            let batch = self.drain_batch();
            if !batch.is_empty() {
                self.process_batch(batch, Instant::now()).await;
            }
        }
    }

    fn drain_batch(&self) -> Vec<Candidate> {
        let mut queue = self.queue.lock().expect("vote generator queue poisoned");
        let take = self.settings.confirm_ack_hashes_max.min(queue.len());
        queue.drain(..take).collect()
    }

    /// The generation pipeline for one batch (spec.md §4.6 steps 1-6).
    /// Returns the signed votes actually emitted, one per local
    /// representative.
    pub async fn process_batch(&self, batch: Vec<Candidate>, now: Instant) -> Vec<VoteMessage> {
        let mut votable = Vec::new();

        for candidate in batch {
            if !self.spacing.votable(candidate.root, candidate.hash, now) {
                self.stats.increment("vote_spacing_suppressed");
                continue;
            }

            if self.history.exists(candidate.root, candidate.hash, self.is_final) {
                // Already signed; nothing new to emit, and spacing does not
                // need re-flagging since the prior emission already did.
                continue;
            }

            if !self.should_vote(&candidate).await {
                continue;
            }

            self.spacing.flag(candidate.root, candidate.hash, now);
            votable.push(candidate);
        }

        if votable.is_empty() {
            return Vec::new();
        }

        let hashes: Vec<BlockHash> = votable.iter().map(|c| c.hash).collect();
        let timestamp: Timestamp = if self.is_final {
            TIMESTAMP_SENTINEL
        } else {
            round_timestamp()
        };

        let mut emitted = Vec::new();
        for representative in self.wallet.representatives() {
            let unsigned = VoteMessage {
                representative,
                timestamp,
                hashes: hashes.clone(),
                signature: crate::vote::Signature([0; 64]),
            };
            let signing_hash = unsigned.signing_hash();
            let Some(signature) = self.wallet.sign(&representative, &signing_hash) else {
                continue;
            };
            let signed = VoteMessage {
                signature,
                ..unsigned
            };

            for candidate in &votable {
                self.history.record(
                    candidate.root,
                    candidate.hash,
                    self.is_final,
                    vec![signed.clone()],
                );
            }

            if self.is_final {
                self.network.flood_vote_pr(signed.clone()).await;
            } else {
                self.network.flood_vote(signed.clone(), 0.5).await;
            }
            emitted.push(signed);
        }

        emitted
    }

    /// spec.md §4.6 step 3: normal votes require the block to exist with
    /// confirmed dependents; final votes additionally require the ledger's
    /// `final_votes(root)` slot to accept this hash.
    async fn should_vote(&self, candidate: &Candidate) -> bool {
        if !self.ledger.block_exists(&candidate.hash).await {
            return false;
        }
        if !self.ledger.dependents_confirmed(&candidate.hash).await {
            return false;
        }
        if self.is_final {
            let accepted = self
                .ledger
                .final_votes_check_and_put(candidate.root, candidate.hash)
                .await;
            if !accepted {
                self.stats.increment("non_votable");
                return false;
            }
        }
        true
    }

    /// `generator.generate(blocks, channel)` (spec.md §6.2): the reply path
    /// for `confirm_req` handling, serving only already-signed votes from
    /// local history rather than signing anything new.
    pub async fn reply(&self, requests: &[Candidate], channel: &Arc<dyn Channel>) -> usize {
        let mut replied = 0;
        for candidate in requests {
            if let Some(votes) = self.history.find(candidate.root, candidate.hash, self.is_final) {
                for vote in votes {
                    let sent = channel
                        .send(
                            OutboundMessage::Vote(vote),
                            DropPolicy::CanDrop,
                            BandwidthLimitType::Vote,
                        )
                        .await;
                    if sent {
                        replied += 1;
                    }
                }
            }
        }
        replied
    }
}

impl VoteBroadcaster for VoteGenerator {
    fn add(&self, root: QualifiedRoot, hash: BlockHash) {
        self.add(root, hash);
    }
}

fn round_timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}
