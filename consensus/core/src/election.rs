//! Per-fork consensus state machine (spec.md §3.3, §4.1).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use strum::Display;

use crate::error::Error;
use crate::vote::{Account, Amount, BlockHash, QualifiedRoot, Timestamp, TIMESTAMP_SENTINEL};
use crate::vote_index::{InsertResult, VoteIndex};

/// A block identity tracked by an election. The core never interprets the
/// payload; it only needs to recover the hash a candidate block votes for.
pub trait ElectionBlock: Clone + Send + Sync + 'static {
    fn hash(&self) -> BlockHash;
}

/// Upper bound on the number of distinct forks an election will track
/// (spec.md §3.3: "bounded at ~1000").
pub const MAX_BLOCKS_PER_ELECTION: usize = 1000;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ElectionState {
    Passive,
    Active,
    Confirmed,
    ExpiredConfirmed,
    ExpiredUnconfirmed,
    Cancelled,
}

impl ElectionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ElectionState::ExpiredConfirmed
                | ElectionState::ExpiredUnconfirmed
                | ElectionState::Cancelled
        )
    }

    /// The static transition table of spec.md §4.1: everything not listed
    /// here is a hard error.
    fn can_transition_to(self, to: ElectionState) -> bool {
        use ElectionState::*;
        matches!(
            (self, to),
            (Passive, Active)
                | (Passive, Confirmed)
                | (Passive, ExpiredUnconfirmed)
                | (Passive, Cancelled)
                | (Active, Confirmed)
                | (Active, ExpiredUnconfirmed)
                | (Active, Cancelled)
                | (Confirmed, ExpiredConfirmed)
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StateEntry {
    pub state: ElectionState,
    pub since: Instant,
}

/// One of the four election sources (spec.md §3.3); drives lifetime and
/// confirmation-request cadence.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Behavior {
    Manual,
    Priority,
    Hinted,
    Optimistic,
}

impl Behavior {
    /// Time-to-live before an unconfirmed election expires (spec.md §4.1,
    /// §6.3): 5 minutes for priority/manual, 30 seconds for hinted/optimistic.
    pub fn time_to_live(self) -> Duration {
        match self {
            Behavior::Priority | Behavior::Manual => Duration::from_secs(5 * 60),
            Behavior::Hinted | Behavior::Optimistic => Duration::from_secs(30),
        }
    }

    /// `confirm_req_time`: spacing between confirmation request rounds.
    /// `5 * base_latency` for manual/priority/hinted, `2 * base_latency` for
    /// optimistic (spec.md §4.1).
    pub fn confirm_req_time(self, base_latency: Duration) -> Duration {
        match self {
            Behavior::Manual | Behavior::Priority | Behavior::Hinted => base_latency * 5,
            Behavior::Optimistic => base_latency * 2,
        }
    }
}

/// The consensus sub-state (spec.md §3.3), independent of lifecycle state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConsensusState {
    NoQuorum,
    QuorumReached { candidate: BlockHash },
    FinalQuorumReached { candidate: BlockHash, winner: BlockHash },
}

/// Whether a round of voting should happen, and with what timestamp
/// (spec.md §4.1 "Vote request generation").
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VoteRequest {
    pub hash: BlockHash,
    pub timestamp: Timestamp,
}

/// Outcome of a single lifecycle tick (spec.md §4.3 `request_loop`):
/// `Finished` elections are torn down by the active-elections container.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TickOutcome {
    Continue,
    Finished,
}

/// How long an election may sit `Passive` before being promoted to
/// `Active`, expressed as a multiple of `base_latency` (spec.md §4.1). The
/// source does not name an exact factor; we use the same order of magnitude
/// as `confirm_req_time`'s 5x multiplier for non-optimistic behaviors. See
/// DESIGN.md.
pub const PASSIVE_DURATION_FACTOR: u32 = 5;

pub struct Election<B: ElectionBlock> {
    pub qualified_root: QualifiedRoot,
    pub height: u64,
    pub behavior: Behavior,

    blocks: HashMap<BlockHash, B>,
    current_block: BlockHash,
    winner_block: Option<BlockHash>,
    vote_index: VoteIndex,
    consensus: ConsensusState,
    state: StateEntry,

    pub election_start: Instant,
    pub last_req: Option<Instant>,
    pub last_broadcast_time: Option<Instant>,
    pub last_broadcast_hash: Option<BlockHash>,
    pub last_vote_time: Option<Instant>,
    /// `(hash, is_final)` of the last vote this node cast locally for this
    /// election (spec.md §3.3).
    pub last_vote: Option<(BlockHash, bool)>,
    pub confirmation_request_count: u32,
}

impl<B: ElectionBlock> Election<B> {
    pub fn new(
        qualified_root: QualifiedRoot,
        height: u64,
        genesis: B,
        behavior: Behavior,
        now: Instant,
    ) -> Self {
        let hash = genesis.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, genesis);
        Self {
            qualified_root,
            height,
            behavior,
            blocks,
            current_block: hash,
            winner_block: None,
            vote_index: VoteIndex::new(),
            consensus: ConsensusState::NoQuorum,
            state: StateEntry {
                state: ElectionState::Passive,
                since: now,
            },
            election_start: now,
            last_req: None,
            last_broadcast_time: None,
            last_broadcast_hash: None,
            last_vote_time: None,
            last_vote: None,
            confirmation_request_count: 0,
        }
    }

    pub fn state(&self) -> ElectionState {
        self.state.state
    }

    pub fn consensus(&self) -> ConsensusState {
        self.consensus
    }

    pub fn winner(&self) -> Option<BlockHash> {
        self.winner_block
    }

    pub fn current_block(&self) -> BlockHash {
        self.current_block
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockHash> {
        self.blocks.keys()
    }

    pub fn block(&self, hash: &BlockHash) -> Option<&B> {
        self.blocks.get(hash)
    }

    pub fn vote_index(&self) -> &VoteIndex {
        &self.vote_index
    }

    /// Record a new fork observed on this root. Returns `false` once the
    /// per-election fork bound is reached and the block is neither already
    /// known nor the current ledger block.
    pub fn process(&mut self, block: B) -> bool {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return true;
        }
        if self.blocks.len() >= MAX_BLOCKS_PER_ELECTION {
            return false;
        }
        self.blocks.insert(hash, block);
        true
    }

    /// Called when the block processor reports that the ledger now holds a
    /// different block at this slot (spec.md data-flow step 3/4).
    pub fn set_current_block(&mut self, hash: BlockHash) {
        self.current_block = hash;
    }

    /// Ingest one (representative, timestamp, hash) tuple (spec.md §4.1's
    /// consensus sub-state transitions).
    pub fn vote(
        &mut self,
        representative: Account,
        timestamp: Timestamp,
        hash: BlockHash,
        weight: Amount,
        quorum_delta: Amount,
    ) -> InsertResult {
        let result = self.vote_index.insert_or_update(crate::vote::Vote {
            hash,
            representative,
            weight,
            timestamp,
        });

        if result == InsertResult::Ignored {
            return result;
        }

        if let ConsensusState::FinalQuorumReached { .. } = self.consensus {
            // The outcome cannot change; the vote index was still updated
            // above so invariant #1 (latest timestamp per representative)
            // holds, but the consensus sub-state is frozen.
            return result;
        }

        if let Some(winner) = self.vote_index.reached_final_quorum(quorum_delta) {
            let candidate = match self.consensus {
                ConsensusState::QuorumReached { candidate } => candidate,
                _ => winner,
            };
            self.consensus = ConsensusState::FinalQuorumReached { candidate, winner };
            self.winner_block = Some(winner);
        } else if let Some(candidate) = self.vote_index.reached_quorum(quorum_delta) {
            let changed = match self.consensus {
                ConsensusState::QuorumReached { candidate: current } => current != candidate,
                ConsensusState::NoQuorum => true,
                ConsensusState::FinalQuorumReached { .. } => false,
            };
            if changed {
                self.consensus = ConsensusState::QuorumReached { candidate };
            }
        }

        result
    }

    /// spec.md §4.1 "Vote request generation": what this node should vote
    /// for this round, if anything.
    pub fn vote_request(&self) -> Option<VoteRequest> {
        match self.consensus {
            ConsensusState::NoQuorum => Some(VoteRequest {
                hash: self.current_block,
                timestamp: round_timestamp(),
            }),
            ConsensusState::QuorumReached { candidate }
            | ConsensusState::FinalQuorumReached { candidate, .. } => {
                if self.current_block == candidate {
                    Some(VoteRequest {
                        hash: candidate,
                        timestamp: TIMESTAMP_SENTINEL,
                    })
                } else {
                    None
                }
            }
        }
    }

    pub fn transition(&mut self, to: ElectionState, now: Instant) -> Result<(), Error> {
        if !self.state.state.can_transition_to(to) {
            return Err(Error::IllegalLifecycleTransition {
                from: self.state.state,
                to,
            });
        }
        self.state = StateEntry { state: to, since: now };
        Ok(())
    }

    pub fn cancel(&mut self, now: Instant) -> Result<(), Error> {
        self.transition(ElectionState::Cancelled, now)
    }

    /// spec.md §4.1 "Confirmation": transitions to `confirmed`, returns the
    /// winner hash. Preconditions: a winner must be known.
    pub fn confirm_once(&mut self, now: Instant) -> Result<BlockHash, Error> {
        let winner = self.winner_block.ok_or(Error::ConfirmWithoutWinner)?;
        self.transition(ElectionState::Confirmed, now)?;
        Ok(winner)
    }

    /// spec.md §4.1 lifecycle tick. Returns whether the active-elections
    /// container should clean this election up.
    pub fn tick(&mut self, now: Instant, base_latency: Duration) -> TickOutcome {
        match self.state.state {
            ElectionState::Passive => {
                if now.duration_since(self.state.since)
                    >= base_latency * PASSIVE_DURATION_FACTOR
                {
                    let _ = self.transition(ElectionState::Active, now);
                }
                TickOutcome::Continue
            }
            ElectionState::Active => {
                if now.duration_since(self.election_start) > self.behavior.time_to_live() {
                    let _ = self.transition(ElectionState::ExpiredUnconfirmed, now);
                    return TickOutcome::Finished;
                }
                TickOutcome::Continue
            }
            ElectionState::Confirmed => {
                let _ = self.transition(ElectionState::ExpiredConfirmed, now);
                TickOutcome::Finished
            }
            ElectionState::ExpiredConfirmed
            | ElectionState::ExpiredUnconfirmed
            | ElectionState::Cancelled => TickOutcome::Finished,
        }
    }

    /// spec.md §4.1 "Broadcast predicates" (vote half).
    pub fn should_broadcast_vote(&self, now: Instant, broadcast_interval: Duration) -> bool {
        let Some(request) = self.vote_request() else {
            return false;
        };
        match self.last_vote {
            None => true,
            Some((last_hash, last_final)) => {
                let elapsed = self
                    .last_vote_time
                    .map(|t| now.duration_since(t) >= broadcast_interval)
                    .unwrap_or(true);
                let switched_to_final = request.timestamp == TIMESTAMP_SENTINEL && !last_final;
                elapsed || request.hash != last_hash || switched_to_final
            }
        }
    }

    /// spec.md §4.1 "Broadcast predicates" (block half).
    pub fn should_broadcast_block(&self, now: Instant, broadcast_interval: Duration) -> bool {
        match (self.last_broadcast_time, self.last_broadcast_hash) {
            (None, _) => true,
            (Some(t), Some(last)) => {
                now.duration_since(t) >= broadcast_interval || self.current_block != last
            }
            (Some(_), None) => true,
        }
    }

    pub fn should_request_confirmations(&self, now: Instant, confirm_req_time: Duration) -> bool {
        match self.last_req {
            None => true,
            Some(t) => now.duration_since(t) >= confirm_req_time,
        }
    }

    pub fn record_vote_broadcast(&mut self, now: Instant, request: VoteRequest) {
        self.last_vote_time = Some(now);
        self.last_vote = Some((request.hash, request.timestamp == TIMESTAMP_SENTINEL));
    }

    pub fn record_block_broadcast(&mut self, now: Instant) {
        self.last_broadcast_time = Some(now);
        self.last_broadcast_hash = Some(self.current_block);
    }

    pub fn record_confirmation_request(&mut self, now: Instant) {
        self.last_req = Some(now);
        self.confirmation_request_count += 1;
    }
}

/// A fresh round timestamp for non-final votes. Nano-style elections use a
/// roughly-monotonic millisecond counter here; callers only need ordering
/// between successive rounds from this node, never cross-node agreement.
fn round_timestamp() -> Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or_default()
}
