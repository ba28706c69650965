//! Election scheduler (spec.md §4.4): four independent sub-schedulers that
//! decide which account frontiers get promoted into active elections.
//! They share no mutable state; coordination happens only through
//! `ActiveElections::insert`/`vacancy` (spec.md §9).

mod hinted;
mod manual;
mod optimistic;
mod priority;

pub use hinted::HintedScheduler;
pub use manual::{ManualScheduler, ManualSubmission};
pub use optimistic::OptimisticScheduler;
pub use priority::{PriorityScheduler, PrioritySubmission};

use crate::election::{Behavior, ElectionBlock};
use crate::active_elections::ActiveElections;

/// spec.md §4.4 overfill policy: if any behavior's vacancy has fallen
/// below `-(N_active / 4)`, the manual and hinted pumps evict the oldest
/// active election before inserting, rather than growing past the
/// overfill cap entirely unbounded (spec.md §8 invariant 7).
pub fn should_evict_before_insert<B: ElectionBlock>(
    active: &ActiveElections<B>,
    n_active: usize,
) -> bool {
    let threshold = -((n_active / 4) as isize);
    [
        Behavior::Priority,
        Behavior::Manual,
        Behavior::Hinted,
        Behavior::Optimistic,
    ]
    .iter()
    .any(|&behavior| active.vacancy(behavior) < threshold)
}
