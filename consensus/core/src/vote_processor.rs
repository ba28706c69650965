//! Vote processor (spec.md data-flow step 1): verifies signatures in
//! batches and enforces per-tier admission backpressure before a vote
//! reaches the router.

use std::sync::Arc;

use lattice_consensus_settings::VoteProcessorSettings;

use crate::collaborators::OnlineReps;
use crate::stats::Stats;
use crate::vote::{Amount, VoteMessage};

/// Admission tier, by representative weight as a percentage of online
/// stake (spec.md §6.3). Higher tiers get priority under backpressure.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AdmissionTier {
    Tier1,
    Tier2,
    Tier3,
    Untiered,
}

pub struct VoteProcessor {
    online_reps: Arc<dyn OnlineReps>,
    stats: Arc<dyn Stats>,
    settings: VoteProcessorSettings,
}

impl VoteProcessor {
    pub fn new(
        online_reps: Arc<dyn OnlineReps>,
        stats: Arc<dyn Stats>,
        settings: VoteProcessorSettings,
    ) -> Self {
        Self {
            online_reps,
            stats,
            settings,
        }
    }

    /// Which admission tier a representative's weight falls into, relative
    /// to the online trended stake.
    pub fn tier_of(&self, weight: Amount) -> AdmissionTier {
        let trended = self.online_reps.trended();
        if trended == 0 {
            return AdmissionTier::Untiered;
        }
        let percent = (weight as f64 / trended as f64) * 100.0;
        if percent >= self.settings.tier_3_percent {
            AdmissionTier::Tier3
        } else if percent >= self.settings.tier_2_percent {
            AdmissionTier::Tier2
        } else if percent >= self.settings.tier_1_percent {
            AdmissionTier::Tier1
        } else {
            AdmissionTier::Untiered
        }
    }

    /// Verify one vote's signature against its signing hash. Accepts a
    /// pluggable verifier so the actual elliptic-curve arithmetic can live
    /// behind whichever key scheme the wallet collaborator uses.
    pub fn verify<F>(&self, vote: &VoteMessage, verify_signature: F) -> bool
    where
        F: FnOnce(&[u8; 32], &crate::vote::Signature, &crate::vote::Account) -> bool,
    {
        let ok = verify_signature(&vote.signing_hash(), &vote.signature, &vote.representative);
        if !ok {
            self.stats.increment("vote_invalid_signature");
        }
        ok
    }

    /// Under pressure (more verified votes than `io_threads` can route this
    /// cycle), admit highest tiers first. `capacity` is how many of
    /// `candidates` may be admitted this cycle.
    pub fn admit<'a>(
        &self,
        candidates: &'a [(VoteMessage, Amount)],
        capacity: usize,
    ) -> Vec<&'a VoteMessage> {
        if candidates.len() <= capacity {
            return candidates.iter().map(|(v, _)| v).collect();
        }

        let mut ranked: Vec<&(VoteMessage, Amount)> = candidates.iter().collect();
        ranked.sort_by(|a, b| {
            tier_rank(self.tier_of(b.1)).cmp(&tier_rank(self.tier_of(a.1)))
        });
        let dropped = ranked.len() - capacity;
        self.stats.increment("vote_admission_dropped");
        let _ = dropped;
        ranked.into_iter().take(capacity).map(|(v, _)| v).collect()
    }
}

fn tier_rank(tier: AdmissionTier) -> u8 {
    match tier {
        AdmissionTier::Tier3 => 3,
        AdmissionTier::Tier2 => 2,
        AdmissionTier::Tier1 => 1,
        AdmissionTier::Untiered => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::CountingStats;
    use crate::vote::{Account, Signature};

    struct FixedOnlineReps {
        trended: Amount,
    }
    impl OnlineReps for FixedOnlineReps {
        fn delta(&self) -> Amount {
            self.trended / 2
        }
        fn trended(&self) -> Amount {
            self.trended
        }
    }

    fn processor(trended: Amount) -> VoteProcessor {
        VoteProcessor::new(
            Arc::new(FixedOnlineReps { trended }),
            Arc::new(CountingStats::default()),
            VoteProcessorSettings::default(),
        )
    }

    #[test]
    fn tier_classification_by_weight_percentage() {
        let processor = processor(1_000_000);
        assert_eq!(processor.tier_of(60_000), AdmissionTier::Tier3); // 6%
        assert_eq!(processor.tier_of(20_000), AdmissionTier::Tier2); // 2%
        assert_eq!(processor.tier_of(2_000), AdmissionTier::Tier1); // 0.2%
        assert_eq!(processor.tier_of(100), AdmissionTier::Untiered);
    }

    #[test]
    fn invalid_signature_is_rejected_and_counted() {
        let stats = Arc::new(CountingStats::default());
        let processor = VoteProcessor::new(
            Arc::new(FixedOnlineReps { trended: 100 }),
            stats.clone(),
            VoteProcessorSettings::default(),
        );
        let vote = VoteMessage {
            representative: Account([1; 32]),
            timestamp: 10,
            hashes: vec![crate::vote::BlockHash([2; 32])],
            signature: Signature([0; 64]),
        };
        assert!(!processor.verify(&vote, |_, _, _| false));
        assert_eq!(stats.count("vote_invalid_signature"), 1);
    }

    #[test]
    fn admission_prefers_higher_tiers_under_pressure() {
        let processor = processor(1_000_000);
        let low = VoteMessage {
            representative: Account([1; 32]),
            timestamp: 1,
            hashes: vec![],
            signature: Signature([0; 64]),
        };
        let high = VoteMessage {
            representative: Account([2; 32]),
            timestamp: 1,
            hashes: vec![],
            signature: Signature([0; 64]),
        };
        let candidates = vec![(low, 100), (high, 60_000)];
        let admitted = processor.admit(&candidates, 1);
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].representative, Account([2; 32]));
    }
}
