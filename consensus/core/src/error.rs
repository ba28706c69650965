use thiserror::Error;

use crate::election::{ConsensusState, ElectionState};

/// Structural errors: these indicate a programmer error, not a network
/// condition. Per spec.md §7 they are release-asserted rather than
/// propagated as ordinary control flow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("illegal election lifecycle transition: {from:?} -> {to:?}")]
    IllegalLifecycleTransition {
        from: ElectionState,
        to: ElectionState,
    },

    #[error("illegal consensus transition: {from:?} -> {to:?}")]
    IllegalConsensusTransition {
        from: ConsensusState,
        to: ConsensusState,
    },

    #[error("confirm_once called without a winner block")]
    ConfirmWithoutWinner,

    #[error("quorum delta must be greater than zero")]
    ZeroQuorumDelta,
}
