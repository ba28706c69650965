//! The live-election registry (spec.md §4.3): one election per contested
//! account-chain root, bounded per `Behavior` by a percentage of the total
//! capacity, ticked on a fixed cadence by `request_loop`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lattice_consensus_settings::{ActiveElectionsSettings, VotingSettings};

use crate::collaborators::{ConfirmingSet, ElectionObserver, Network, VoteBroadcaster};
use crate::confirmation_solicitor::{ConfirmationSolicitor, SolicitorBudget};
use crate::election::{Behavior, ConsensusState, Election, ElectionBlock, ElectionState, TickOutcome};
use crate::recently_confirmed::RecentlyConfirmed;
use crate::vote::{Amount, BlockHash, QualifiedRoot, TIMESTAMP_SENTINEL};
use crate::vote_cache::VoteCache;
use crate::vote_index::InsertResult;
use crate::vote_router::{VoteRouter, VoteTarget};

/// Wraps one `Election<B>` so it can be registered with the vote router as
/// a `dyn VoteTarget` without leaking `B` into the router's API.
pub struct ElectionEntry<B: ElectionBlock> {
    election: Mutex<Election<B>>,
}

impl<B: ElectionBlock> ElectionEntry<B> {
    pub fn with<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&Election<B>) -> T,
    {
        f(&self.election.lock().expect("election poisoned"))
    }

    pub fn with_mut<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut Election<B>) -> T,
    {
        f(&mut self.election.lock().expect("election poisoned"))
    }
}

impl<B: ElectionBlock> VoteTarget for ElectionEntry<B> {
    fn root(&self) -> QualifiedRoot {
        self.with(|e| e.qualified_root)
    }

    fn vote(
        &self,
        representative: crate::vote::Account,
        timestamp: crate::vote::Timestamp,
        hash: BlockHash,
        weight: Amount,
        quorum_delta: Amount,
    ) -> InsertResult {
        self.with_mut(|e| e.vote(representative, timestamp, hash, weight, quorum_delta))
    }
}

pub struct InsertOutcome<B: ElectionBlock> {
    pub election: Arc<ElectionEntry<B>>,
    pub inserted: bool,
}

pub struct ActiveElections<B: ElectionBlock> {
    elections: Mutex<HashMap<QualifiedRoot, Arc<ElectionEntry<B>>>>,
    router: Arc<VoteRouter>,
    vote_cache: VoteCache,
    recently_confirmed: RecentlyConfirmed,
    observer: Arc<dyn ElectionObserver>,
    settings: ActiveElectionsSettings,
    voting_settings: VotingSettings,
    network: Arc<dyn Network>,
    confirming_set: Arc<dyn ConfirmingSet>,
    vote_broadcaster_normal: Arc<dyn VoteBroadcaster>,
    vote_broadcaster_final: Arc<dyn VoteBroadcaster>,
    solicitor_budget: SolicitorBudget,
}

impl<B: ElectionBlock> ActiveElections<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<VoteRouter>,
        vote_cache: VoteCache,
        recently_confirmed: RecentlyConfirmed,
        observer: Arc<dyn ElectionObserver>,
        settings: ActiveElectionsSettings,
        voting_settings: VotingSettings,
        network: Arc<dyn Network>,
        confirming_set: Arc<dyn ConfirmingSet>,
        vote_broadcaster_normal: Arc<dyn VoteBroadcaster>,
        vote_broadcaster_final: Arc<dyn VoteBroadcaster>,
        solicitor_budget: SolicitorBudget,
    ) -> Self {
        Self {
            elections: Mutex::new(HashMap::new()),
            router,
            vote_cache,
            recently_confirmed,
            observer,
            settings,
            voting_settings,
            network,
            confirming_set,
            vote_broadcaster_normal,
            vote_broadcaster_final,
            solicitor_budget,
        }
    }

    /// spec.md §4.3: idempotent on root collision — a second insert for an
    /// already-contested root returns the existing election untouched.
    /// Returns `None` if `behavior` is at its own cap and the container as
    /// a whole is at `N_active` (spec.md §4.3's refusal condition).
    pub fn insert(
        &self,
        qualified_root: QualifiedRoot,
        height: u64,
        genesis: B,
        behavior: Behavior,
        quorum_delta: Amount,
        now: Instant,
    ) -> Option<InsertOutcome<B>> {
        let mut elections = self.elections.lock().expect("active elections poisoned");
        if let Some(existing) = elections.get(&qualified_root) {
            return Some(InsertOutcome {
                election: existing.clone(),
                inserted: false,
            });
        }

        let behavior_count = elections
            .values()
            .filter(|entry| entry.with(|e| e.behavior == behavior))
            .count();
        if behavior_count >= self.limit(behavior) && elections.len() >= self.settings.size {
            return None;
        }

        let hash = genesis.hash();
        let entry = Arc::new(ElectionEntry {
            election: Mutex::new(Election::new(qualified_root, height, genesis, behavior, now)),
        });
        elections.insert(qualified_root, entry.clone());

        let target: Arc<dyn VoteTarget> = entry.clone();
        self.router.connect(hash, &target);

        if let Some(cached) = self.vote_cache.find(&hash) {
            for (representative, timestamp, weight) in cached.voters {
                entry.with_mut(|e| e.vote(representative, timestamp, hash, weight, quorum_delta));
            }
        }

        self.observer.on_started(qualified_root, behavior);

        Some(InsertOutcome {
            election: entry,
            inserted: true,
        })
    }

    pub fn get(&self, qualified_root: &QualifiedRoot) -> Option<Arc<ElectionEntry<B>>> {
        self.elections
            .lock()
            .expect("active elections poisoned")
            .get(qualified_root)
            .cloned()
    }

    pub fn contains(&self, qualified_root: &QualifiedRoot) -> bool {
        self.elections
            .lock()
            .expect("active elections poisoned")
            .contains_key(qualified_root)
    }

    pub fn count(&self) -> usize {
        self.elections.lock().expect("active elections poisoned").len()
    }

    pub fn count_behavior(&self, behavior: Behavior) -> usize {
        self.elections
            .lock()
            .expect("active elections poisoned")
            .values()
            .filter(|entry| entry.with(|e| e.behavior == behavior))
            .count()
    }

    /// Capacity budget for `behavior` (spec.md §4.3): priority and manual
    /// elections share the full pool, hinted/optimistic are capped to a
    /// percentage of it.
    pub fn limit(&self, behavior: Behavior) -> usize {
        match behavior {
            Behavior::Priority | Behavior::Manual => self.settings.size,
            Behavior::Hinted => {
                self.settings.size * self.settings.hinted_limit_percentage as usize / 100
            }
            Behavior::Optimistic => {
                self.settings.size * self.settings.optimistic_limit_percentage as usize / 100
            }
        }
    }

    /// Remaining room for `behavior`; negative once over budget (spec.md
    /// §4.4's overfill-eviction threshold is expressed in terms of this).
    pub fn vacancy(&self, behavior: Behavior) -> isize {
        self.limit(behavior) as isize - self.count_behavior(behavior) as isize
    }

    /// SPEC_FULL.md §C.5: element counts per internal index, for an
    /// external `confirmation_history`/`stats` endpoint to surface.
    pub fn container_info(&self) -> Vec<(&'static str, usize)> {
        vec![("roots", self.count())]
    }

    /// spec.md §4.3 `request_loop` tick, §4.1's `active`/`confirmed`
    /// action lists and §4.7's "prepared once per active-elections tick"
    /// solicitor: try confirmation, drive the broadcast/request predicates
    /// through one shared `ConfirmationSolicitor`, flush the batched
    /// confirmation requests, then advance every election's lifecycle state
    /// by one step and tear down the ones that finished.
    pub async fn tick_all(&self, now: Instant, base_latency: Duration) {
        let snapshot: Vec<(QualifiedRoot, Arc<ElectionEntry<B>>)> = self
            .elections
            .lock()
            .expect("active elections poisoned")
            .iter()
            .map(|(root, entry)| (*root, entry.clone()))
            .collect();

        let mut solicitor = ConfirmationSolicitor::prepare(self.network.clone(), self.solicitor_budget);
        for (root, entry) in &snapshot {
            self.pump(*root, entry, now, base_latency, &mut solicitor).await;
        }
        solicitor.flush(self.voting_settings.confirm_req_hashes_max).await;

        for (root, entry) in snapshot {
            let outcome = entry.with_mut(|e| e.tick(now, base_latency));
            if outcome == TickOutcome::Finished {
                self.finish(root, &entry);
            }
        }
    }

    /// One election's share of a tick cycle (spec.md §4.1): try confirming
    /// if a winner is known, then (whether newly confirmed or already so)
    /// broadcast vote/block and request confirmations under their
    /// predicates.
    async fn pump(
        &self,
        root: QualifiedRoot,
        entry: &Arc<ElectionEntry<B>>,
        now: Instant,
        base_latency: Duration,
        solicitor: &mut ConfirmationSolicitor,
    ) {
        if entry.with(|e| e.state()) == ElectionState::Active {
            let has_winner =
                entry.with(|e| matches!(e.consensus(), ConsensusState::FinalQuorumReached { .. }));
            if has_winner {
                if let Ok(winner) = entry.with_mut(|e| e.confirm_once(now)) {
                    self.recently_confirmed.insert(root, winner);
                    self.confirming_set.add(winner);
                    self.observer.on_confirmed(root, winner);
                }
            }
        }

        let state = entry.with(|e| e.state());
        if !matches!(state, ElectionState::Active | ElectionState::Confirmed) {
            return;
        }

        if entry.with(|e| e.should_broadcast_vote(now, self.voting_settings.vote_broadcast_interval)) {
            if let Some(request) = entry.with(|e| e.vote_request()) {
                let broadcaster = if request.timestamp == TIMESTAMP_SENTINEL {
                    &self.vote_broadcaster_final
                } else {
                    &self.vote_broadcaster_normal
                };
                broadcaster.add(root, request.hash);
                entry.with_mut(|e| e.record_vote_broadcast(now, request));
            }
        }

        if entry.with(|e| e.should_broadcast_block(now, self.voting_settings.block_broadcast_interval)) {
            let current_block = entry.with(|e| e.current_block());
            if solicitor.broadcast(current_block).await {
                entry.with_mut(|e| e.record_block_broadcast(now));
            }
        }

        if state == ElectionState::Active {
            let confirm_req_time = entry.with(|e| e.behavior.confirm_req_time(base_latency));
            if entry.with(|e| e.should_request_confirmations(now, confirm_req_time)) {
                let current_block = entry.with(|e| e.current_block());
                solicitor.request(current_block, root);
                entry.with_mut(|e| e.record_confirmation_request(now));
            }
        }
    }

    /// spec.md §5's ordering guarantee: recently-confirmed is populated
    /// *before* the router disconnect, so a vote for `winner` arriving on
    /// another thread between these two steps is classified `replay`
    /// rather than `indeterminate`.
    fn finish(&self, root: QualifiedRoot, entry: &Arc<ElectionEntry<B>>) {
        let (state, winner, hashes): (ElectionState, Option<BlockHash>, Vec<BlockHash>) =
            entry.with(|e| (e.state(), e.winner(), e.blocks().copied().collect()));

        if state == ElectionState::ExpiredConfirmed {
            if let Some(winner) = winner {
                self.recently_confirmed.insert(root, winner);
            }
        }

        for hash in &hashes {
            self.router.disconnect(hash);
        }
        self.elections
            .lock()
            .expect("active elections poisoned")
            .remove(&root);

        match state {
            ElectionState::ExpiredConfirmed => {
                self.observer.on_confirmed(root, winner.unwrap_or(root.root));
            }
            ElectionState::ExpiredUnconfirmed => self.observer.on_expired(root),
            ElectionState::Cancelled => self.observer.on_cancelled(root),
            _ => {}
        }
    }

    /// spec.md §4.3 `request_loop`: a fixed-cadence background pump, in the
    /// manner of the topdown voting poller, advancing every election once
    /// per tick until cancelled.
    pub async fn request_loop(self: Arc<Self>, tick_interval: Duration, base_latency: Duration) {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick_all(Instant::now(), base_latency).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        Channel, DropPolicy, NullConfirmingSet, NullElectionObserver, NullNetwork, NullVoteBroadcaster,
        OutboundMessage,
    };
    use crate::vote::Account;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct TestBlock(BlockHash);
    impl ElectionBlock for TestBlock {
        fn hash(&self) -> BlockHash {
            self.0
        }
    }

    fn qroot(byte: u8) -> QualifiedRoot {
        QualifiedRoot {
            root: BlockHash([byte; 32]),
            previous: BlockHash([byte; 32]),
        }
    }

    fn active() -> ActiveElections<TestBlock> {
        let router = Arc::new(VoteRouter::new(RecentlyConfirmed::new(64), VoteCache::new(64)));
        ActiveElections::new(
            router,
            VoteCache::new(64),
            RecentlyConfirmed::new(64),
            Arc::new(NullElectionObserver),
            ActiveElectionsSettings::default(),
            VotingSettings::default(),
            Arc::new(NullNetwork),
            Arc::new(NullConfirmingSet),
            Arc::new(NullVoteBroadcaster),
            Arc::new(NullVoteBroadcaster),
            SolicitorBudget::default(),
        )
    }

    /// Counts how many representatives a `ConfirmationSolicitor` actually
    /// requested confirmations from, so the pump test below can observe the
    /// solicitor being exercised rather than sitting dead.
    struct CountingChannel {
        representative: Account,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Channel for CountingChannel {
        fn is_full(&self) -> bool {
            false
        }
        fn representative(&self) -> Option<Account> {
            Some(self.representative)
        }
        fn voted_final(&self, _hash: &BlockHash) -> bool {
            false
        }
        async fn send(
            &self,
            _message: OutboundMessage,
            _drop_policy: DropPolicy,
            _bandwidth: crate::collaborators::BandwidthLimitType,
        ) -> bool {
            self.sends.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct CountingNetwork {
        channel: Arc<CountingChannel>,
        broadcasts: AtomicUsize,
    }

    #[async_trait]
    impl crate::collaborators::Network for CountingNetwork {
        async fn flood_vote(&self, _vote: crate::vote::VoteMessage, _fanout_ratio: f64) {}
        async fn flood_vote_pr(&self, _vote: crate::vote::VoteMessage) {}
        async fn flood_message(
            &self,
            _message: OutboundMessage,
            _fanout_ratio: f64,
            _drop_policy: DropPolicy,
        ) {
            self.broadcasts.fetch_add(1, Ordering::SeqCst);
        }
        fn representative_channels(&self) -> Vec<Arc<dyn Channel>> {
            vec![self.channel.clone()]
        }
    }

    #[derive(Default)]
    struct CountingVoteBroadcaster {
        added: AtomicUsize,
    }
    impl VoteBroadcaster for CountingVoteBroadcaster {
        fn add(&self, _root: QualifiedRoot, _hash: BlockHash) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn insert_is_idempotent_on_root_collision() {
        let active = active();
        let root = qroot(1);
        let a = active
            .insert(
                root,
                1,
                TestBlock(BlockHash([1; 32])),
                Behavior::Priority,
                67,
                Instant::now(),
            )
            .unwrap();
        assert!(a.inserted);
        let b = active
            .insert(
                root,
                1,
                TestBlock(BlockHash([9; 32])),
                Behavior::Priority,
                67,
                Instant::now(),
            )
            .unwrap();
        assert!(!b.inserted);
        assert_eq!(active.count(), 1);
    }

    #[test]
    fn insert_seeds_from_vote_cache() {
        let router = Arc::new(VoteRouter::new(RecentlyConfirmed::new(64), VoteCache::new(64)));
        let vote_cache = VoteCache::new(64);
        let hash = BlockHash([1; 32]);
        vote_cache.insert(hash, Account([5; 32]), 10, 80);
        let active = ActiveElections::new(
            router,
            vote_cache,
            RecentlyConfirmed::new(64),
            Arc::new(NullElectionObserver),
            ActiveElectionsSettings::default(),
            VotingSettings::default(),
            Arc::new(NullNetwork),
            Arc::new(NullConfirmingSet),
            Arc::new(NullVoteBroadcaster),
            Arc::new(NullVoteBroadcaster),
            SolicitorBudget::default(),
        );
        let outcome = active
            .insert(
                qroot(1),
                1,
                TestBlock(hash),
                Behavior::Priority,
                67,
                Instant::now(),
            )
            .unwrap();
        let tally = outcome.election.with(|e| e.vote_index().tally(&hash));
        assert_eq!(tally, 80);
    }

    #[test]
    fn limit_scales_hinted_and_optimistic_by_percentage() {
        let active = active();
        let settings = ActiveElectionsSettings::default();
        assert_eq!(active.limit(Behavior::Priority), settings.size);
        assert_eq!(
            active.limit(Behavior::Hinted),
            settings.size * settings.hinted_limit_percentage as usize / 100
        );
    }

    #[tokio::test]
    async fn finished_election_is_removed_and_disconnected() {
        let active = active();
        let root = qroot(1);
        let hash = BlockHash([1; 32]);
        let outcome = active
            .insert(root, 1, TestBlock(hash), Behavior::Hinted, 67, Instant::now())
            .unwrap();
        outcome.election.with_mut(|e| {
            e.transition(ElectionState::Active, Instant::now()).unwrap();
        });
        let past_ttl = Instant::now() + Duration::from_secs(31);
        active.tick_all(past_ttl, Duration::from_millis(25)).await;
        assert!(!active.contains(&root));
        assert_eq!(active.router.size(), 0);
    }

    /// spec.md §4.1 Active-state action list: once a vote ingested outside
    /// the pump brings an election to final quorum, the very next
    /// `tick_all` must confirm it itself (no external `confirm_once` call),
    /// and must exercise the solicitor's broadcast/request paths before the
    /// election expires.
    #[tokio::test]
    async fn tick_all_confirms_and_solicits_without_external_help() {
        let router = Arc::new(VoteRouter::new(RecentlyConfirmed::new(64), VoteCache::new(64)));
        let recently_confirmed = RecentlyConfirmed::new(64);
        let channel = Arc::new(CountingChannel {
            representative: Account([9; 32]),
            sends: AtomicUsize::new(0),
        });
        let network = Arc::new(CountingNetwork {
            channel: channel.clone(),
            broadcasts: AtomicUsize::new(0),
        });
        let vote_broadcaster = Arc::new(CountingVoteBroadcaster::default());
        let active = ActiveElections::new(
            router,
            VoteCache::new(64),
            recently_confirmed.clone(),
            Arc::new(NullElectionObserver),
            ActiveElectionsSettings::default(),
            VotingSettings::default(),
            network.clone(),
            Arc::new(NullConfirmingSet),
            vote_broadcaster.clone(),
            vote_broadcaster.clone(),
            SolicitorBudget::default(),
        );

        let root = qroot(1);
        let hash = BlockHash([1; 32]);
        let quorum_delta = 67;
        let outcome = active
            .insert(root, 1, TestBlock(hash), Behavior::Priority, quorum_delta, Instant::now())
            .unwrap();
        outcome.election.with_mut(|e| {
            e.transition(ElectionState::Active, Instant::now()).unwrap();
            e.vote(Account([1; 32]), TIMESTAMP_SENTINEL, hash, 100, quorum_delta);
        });
        assert!(matches!(
            outcome.election.with(|e| e.consensus()),
            ConsensusState::FinalQuorumReached { .. }
        ));

        active.tick_all(Instant::now(), Duration::from_millis(25)).await;

        assert!(recently_confirmed.contains(&hash));
        assert!(vote_broadcaster.added.load(Ordering::SeqCst) > 0);
        assert!(network.broadcasts.load(Ordering::SeqCst) > 0);
        assert!(channel.sends.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn insert_refuses_once_behavior_and_total_caps_are_both_full() {
        let router = Arc::new(VoteRouter::new(RecentlyConfirmed::new(64), VoteCache::new(64)));
        let settings = ActiveElectionsSettings {
            size: 1,
            ..ActiveElectionsSettings::default()
        };
        let active = ActiveElections::new(
            router,
            VoteCache::new(64),
            RecentlyConfirmed::new(64),
            Arc::new(NullElectionObserver),
            settings,
            VotingSettings::default(),
            Arc::new(NullNetwork),
            Arc::new(NullConfirmingSet),
            Arc::new(NullVoteBroadcaster),
            Arc::new(NullVoteBroadcaster),
            SolicitorBudget::default(),
        );
        let first = active.insert(
            qroot(1),
            1,
            TestBlock(BlockHash([1; 32])),
            Behavior::Priority,
            67,
            Instant::now(),
        );
        assert!(first.is_some());

        let second = active.insert(
            qroot(2),
            1,
            TestBlock(BlockHash([2; 32])),
            Behavior::Priority,
            67,
            Instant::now(),
        );
        assert!(second.is_none());
        assert_eq!(active.count(), 1);
    }
}
