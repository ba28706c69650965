//! Core vote data model (spec.md §3.1).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Block identity. The core never interprets the bytes; it only compares,
/// hashes, and orders them (the numerically-smallest-hash tiebreak in
/// `VoteIndex::leader` relies on `Ord`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A representative's voting identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account(pub [u8; 32]);

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Representative stake, and account balances. The balance domain is
/// `[0, 2^128)` per spec.md §3.5, hence `u128` rather than a wider bignum.
pub type Amount = u128;

/// 64-bit monotonic vote counter. `TIMESTAMP_SENTINEL` is the reserved
/// final-vote marker (spec.md §3.1); every other value orders votes from the
/// same representative (newer supersedes older).
pub type Timestamp = u64;

/// The final-vote sentinel timestamp. Irrevocable: a vote carrying this
/// timestamp always supersedes any non-final vote from the same
/// representative, and can never itself be superseded.
pub const TIMESTAMP_SENTINEL: Timestamp = u64::MAX;

/// Identity of the account-chain slot being contested (spec.md §3.3).
/// `previous` is the hash of the block immediately preceding the contested
/// one; `root` is that same hash, or the account itself for an open block.
/// Used as the primary key for elections.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct QualifiedRoot {
    pub root: BlockHash,
    pub previous: BlockHash,
}

impl fmt::Display for QualifiedRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.root, self.previous)
    }
}

/// A single (election, representative) fact: the representative's current
/// vote for some hash, at some timestamp, carrying the representative's
/// weight as observed at ingest time (spec.md §3.1).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Vote {
    pub hash: BlockHash,
    pub representative: Account,
    pub weight: Amount,
    pub timestamp: Timestamp,
}

impl Vote {
    pub fn is_final(&self) -> bool {
        self.timestamp == TIMESTAMP_SENTINEL
    }
}

/// The logical, already-verified vote message handed from the vote
/// processor to the vote router: one representative attesting to one or
/// more hashes at one timestamp (spec.md §4.6 batches up to
/// `confirm_ack_hashes_max` hashes per message). Wire encoding of this type
/// is out of scope (spec.md §1); the transport collaborator produces and
/// consumes it as an opaque logical object.
#[derive(Clone, Debug)]
pub struct VoteMessage {
    pub representative: Account,
    pub timestamp: Timestamp,
    pub hashes: Vec<BlockHash>,
    pub signature: Signature,
}

impl VoteMessage {
    pub fn is_final(&self) -> bool {
        self.timestamp == TIMESTAMP_SENTINEL
    }

    /// The bytes that were signed: representative, timestamp and the
    /// ordered list of hashes, hashed with blake2b as in the rest of the
    /// ledger's identity scheme.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut hasher = blake2b_simd::Params::new().hash_length(32).to_state();
        hasher.update(&self.representative.0);
        hasher.update(&self.timestamp.to_le_bytes());
        for hash in &self.hashes {
            hasher.update(&hash.0);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(hasher.finalize().as_bytes());
        out
    }
}

/// Where a vote (or a vote-hash classification) originated, for sourcing
/// decisions (spec.md §4.2 step 4: cache-sourced votes are not re-offered
/// to the cache).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VoteSource {
    Live,
    Rebroadcast,
    Cache,
}

/// Outcome of routing one hash from a vote to an election (spec.md §4.2).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VoteCode {
    /// Signature verification failed upstream; never reaches the router in
    /// practice but kept as an outcome so the map stays total.
    Invalid,
    /// The hash belongs to an election that has already confirmed (present
    /// in recently-confirmed).
    Replay,
    /// The vote was applied to a live election.
    Vote,
    /// No live election and no recently-confirmed record for this hash.
    Indeterminate,
    /// The vote index saw the vote but did not accept it (stale timestamp
    /// for an existing representative, or the election already reached
    /// final quorum).
    Ignored,
}

/// A verification-ready signature. The actual elliptic curve arithmetic
/// lives behind the wallet collaborator (spec.md §6.1); the core only
/// ever compares byte strings or hands them to an injected verifier
/// (see `vote_processor::VoteProcessor::verify`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Signature(pub [u8; 64]);
