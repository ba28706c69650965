//! Confirmation solicitor (spec.md §4.7): per active-elections tick,
//! requests votes from known representatives and rebroadcasts the current
//! winner, under a per-cycle budget.

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::collaborators::{BandwidthLimitType, Channel, DropPolicy, Network, OutboundMessage};
use crate::vote::{Account, BlockHash, QualifiedRoot};

/// Budget for one active-elections tick (spec.md §4.7 "budgeted per-cycle
/// limits").
#[derive(Clone, Copy, Debug)]
pub struct SolicitorBudget {
    pub max_block_broadcasts: usize,
    pub max_election_requests: usize,
}

impl Default for SolicitorBudget {
    fn default() -> Self {
        Self {
            max_block_broadcasts: 10,
            max_election_requests: 30,
        }
    }
}

/// One cycle's worth of solicitation: a shuffled representative list
/// prepared once, then drawn down as elections are serviced.
pub struct ConfirmationSolicitor {
    network: Arc<dyn Network>,
    representatives: Vec<Arc<dyn Channel>>,
    broadcasts_remaining: usize,
    requests_per_election: usize,
    pending: HashMap<Account, Vec<(BlockHash, QualifiedRoot)>>,
}

impl ConfirmationSolicitor {
    /// Prepared once per active-elections tick (spec.md §4.7).
    pub fn prepare(network: Arc<dyn Network>, budget: SolicitorBudget) -> Self {
        let mut representatives = network.representative_channels();
        representatives.shuffle(&mut thread_rng());
        Self {
            network,
            representatives,
            broadcasts_remaining: budget.max_block_broadcasts,
            requests_per_election: budget.max_election_requests,
            pending: HashMap::new(),
        }
    }

    /// Flood the candidate block to a random subset of representatives,
    /// decrementing the per-cycle broadcast budget. Returns `false` once
    /// the budget is exhausted.
    pub async fn broadcast(&mut self, hash: BlockHash) -> bool {
        if self.broadcasts_remaining == 0 {
            return false;
        }
        self.broadcasts_remaining -= 1;
        self.network
            .flood_message(
                OutboundMessage::Block(hash),
                0.5,
                DropPolicy::CanDrop,
            )
            .await;
        true
    }

    /// Enqueue a `(hash, root)` confirmation request to every representative
    /// whose channel isn't full and who hasn't already voted final for
    /// `hash`, up to `max_election_requests` reps for this election.
    pub fn request(&mut self, hash: BlockHash, root: QualifiedRoot) {
        let mut requested = 0;
        for channel in &self.representatives {
            if requested >= self.requests_per_election {
                break;
            }
            if channel.is_full() || channel.voted_final(&hash) {
                continue;
            }
            let Some(representative) = channel.representative() else {
                continue;
            };
            self.pending
                .entry(representative)
                .or_default()
                .push((hash, root));
            requested += 1;
        }
    }

    /// Package every representative's queued requests into batched
    /// `confirm_req` messages (up to `confirm_req_hashes_max` per message)
    /// and send them.
    pub async fn flush(&mut self, confirm_req_hashes_max: usize) {
        let pending = std::mem::take(&mut self.pending);
        for (representative, requests) in pending {
            let Some(channel) = self
                .representatives
                .iter()
                .find(|c| c.representative() == Some(representative))
            else {
                continue;
            };
            for batch in requests.chunks(confirm_req_hashes_max) {
                channel
                    .send(
                        OutboundMessage::ConfirmReq(batch.to_vec()),
                        DropPolicy::CanDrop,
                        BandwidthLimitType::ConfirmReq,
                    )
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeChannel {
        representative: Account,
        full: bool,
        voted_final: bool,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Channel for FakeChannel {
        fn is_full(&self) -> bool {
            self.full
        }
        fn representative(&self) -> Option<Account> {
            Some(self.representative)
        }
        fn voted_final(&self, _hash: &BlockHash) -> bool {
            self.voted_final
        }
        async fn send(
            &self,
            _message: OutboundMessage,
            _drop_policy: DropPolicy,
            _bandwidth: BandwidthLimitType,
        ) -> bool {
            self.sends.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct FakeNetwork {
        channels: Mutex<Vec<Arc<dyn Channel>>>,
    }

    #[async_trait]
    impl Network for FakeNetwork {
        async fn flood_vote(&self, _vote: crate::vote::VoteMessage, _fanout_ratio: f64) {}
        async fn flood_vote_pr(&self, _vote: crate::vote::VoteMessage) {}
        async fn flood_message(
            &self,
            _message: OutboundMessage,
            _fanout_ratio: f64,
            _drop_policy: DropPolicy,
        ) {
        }
        fn representative_channels(&self) -> Vec<Arc<dyn Channel>> {
            self.channels.lock().unwrap().clone()
        }
    }

    fn root() -> QualifiedRoot {
        QualifiedRoot {
            root: BlockHash([1; 32]),
            previous: BlockHash([2; 32]),
        }
    }

    #[tokio::test]
    async fn skips_full_and_already_final_channels() {
        let eligible: Arc<dyn Channel> = Arc::new(FakeChannel {
            representative: Account([1; 32]),
            full: false,
            voted_final: false,
            sends: AtomicUsize::new(0),
        });
        let full: Arc<dyn Channel> = Arc::new(FakeChannel {
            representative: Account([2; 32]),
            full: true,
            voted_final: false,
            sends: AtomicUsize::new(0),
        });
        let voted: Arc<dyn Channel> = Arc::new(FakeChannel {
            representative: Account([3; 32]),
            full: false,
            voted_final: true,
            sends: AtomicUsize::new(0),
        });
        let network = Arc::new(FakeNetwork {
            channels: Mutex::new(vec![eligible.clone(), full, voted]),
        });

        let mut solicitor = ConfirmationSolicitor::prepare(network, SolicitorBudget::default());
        solicitor.request(BlockHash([9; 32]), root());
        solicitor.flush(7).await;

        assert_eq!(solicitor.pending.len(), 0);
    }

    #[tokio::test]
    async fn broadcast_budget_is_exhausted() {
        let network = Arc::new(FakeNetwork {
            channels: Mutex::new(vec![]),
        });
        let mut solicitor = ConfirmationSolicitor::prepare(
            network,
            SolicitorBudget {
                max_block_broadcasts: 1,
                max_election_requests: 10,
            },
        );
        assert!(solicitor.broadcast(BlockHash([1; 32])).await);
        assert!(!solicitor.broadcast(BlockHash([1; 32])).await);
    }
}
