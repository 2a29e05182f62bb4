use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Instant,
};

use anyhow::Result;
use parking_lot::{ReentrantMutex, RwLock};
use rand::{seq::IndexedRandom, Rng};
use tokio::sync::watch;
use tracing as log;
use tracing::instrument;

use super::{
    application_state::ApplicationState,
    config::GossipConfig,
    digest::{sort_stalest_first, GossipDigest},
    endpoint::Endpoint,
    endpoint_state::{merge, EndpointState, MergeKind},
    error::{GossipError, GossipResult},
    failure_detector::{FailureDetector, TimeoutFailureDetector},
    feature::FeatureService,
    heartbeat::HeartBeatState,
    messages::{Ack, Ack2, Syn},
    metrics::{GossipMetrics, MetricsSnapshot},
    state_table::EndpointStateTable,
    subscriber::{GossipEvent, Subscriber, SubscriberId, SubscriberRegistry},
    transport::GossipTransport,
    version::VersionGenerator,
    versioned_value::{self, VersionedValue},
};

/// Generations further ahead than this of what we know are treated as garbage.
pub const MAX_GENERATION_DIFFERENCE: i64 = 86400 * 365;

/// Where an initiator-side round stood when it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    SynSent,
    AckReceived,
    Ack2Sent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    Completed,
    /// No response while waiting in `phase`.
    TimedOut { phase: RoundPhase },
    /// The transport reported an error while in `phase`.
    Failed { phase: RoundPhase, reason: String },
}

impl RoundOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RoundOutcome::Completed)
    }
}

#[derive(Debug, Default)]
struct GossipState {
    table: EndpointStateTable,
    live: BTreeSet<Endpoint>,
    unreachable: BTreeSet<Endpoint>,
    just_removed: BTreeMap<Endpoint, Instant>,
    started: bool,
}

impl GossipState {
    fn is_quarantined(&self, endpoint: &Endpoint) -> bool {
        self.just_removed.contains_key(endpoint)
    }
}

/// The gossip engine for one node.
///
/// Owns the endpoint state table. Every mutation (merges, local updates,
/// liveness changes, removals) runs under `apply_guard`, so they are
/// serialized with respect to each other, and subscribers are notified
/// before the mutating call returns. The guard is re-entrant, so a
/// subscriber may publish local state from inside its callback.
pub struct Gossiper {
    config: GossipConfig,
    local: Endpoint,
    versions: VersionGenerator,
    state: RwLock<GossipState>,
    apply_guard: ReentrantMutex<()>,
    subscribers: SubscriberRegistry,
    failure_detector: Arc<dyn FailureDetector>,
    features: Option<Arc<FeatureService>>,
    transport: Arc<dyn GossipTransport>,
    metrics: GossipMetrics,
    stopped: watch::Sender<bool>,
}

impl std::fmt::Debug for Gossiper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gossiper")
            .field("local", &self.local)
            .field("cluster_name", &self.config.cluster_name)
            .field("endpoints", &self.state.read().table.len())
            .finish()
    }
}

impl Gossiper {
    pub fn new(
        config: GossipConfig,
        local: Endpoint,
        transport: Arc<dyn GossipTransport>,
    ) -> GossipResult<Self> {
        config.validate()?;
        let failure_detector = Arc::new(TimeoutFailureDetector::new(config.failure_timeout()));
        let (stopped, _) = watch::channel(false);
        Ok(Self {
            config,
            local,
            versions: VersionGenerator::new(),
            state: RwLock::new(GossipState::default()),
            apply_guard: ReentrantMutex::new(()),
            subscribers: SubscriberRegistry::new(),
            failure_detector,
            features: None,
            transport,
            metrics: GossipMetrics::new(),
            stopped,
        })
    }

    pub fn with_failure_detector(mut self, failure_detector: Arc<dyn FailureDetector>) -> Self {
        self.failure_detector = failure_detector;
        self
    }

    pub fn with_feature_service(mut self, features: Arc<FeatureService>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    pub fn features(&self) -> Option<&Arc<FeatureService>> {
        self.features.as_ref()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_started(&self) -> bool {
        self.state.read().started
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Register the local endpoint and publish its initial states.
    ///
    /// The generation is the current wall-clock second, bumped past
    /// `previous_generation` when the clock has not moved beyond it.
    /// Returns the generation in use.
    pub fn start(
        &self,
        previous_generation: Option<i32>,
        initial_states: impl IntoIterator<Item = (ApplicationState, String)>,
    ) -> GossipResult<i32> {
        let _serial = self.apply_guard.lock();

        let now_secs = i32::try_from(chrono::Utc::now().timestamp()).unwrap_or(i32::MAX);
        let heartbeat = match previous_generation {
            Some(previous) if now_secs <= previous => {
                let mut heartbeat = HeartBeatState::new(previous);
                heartbeat.force_newer_generation();
                heartbeat
            }
            _ => HeartBeatState::new(now_secs),
        };
        let generation = heartbeat.generation;

        let mut local_state = EndpointState::new(heartbeat);
        for (key, value) in initial_states {
            local_state.add_application_state(key, VersionedValue::new(value, self.versions.next()));
        }
        if let Some(features) = &self.features {
            if local_state
                .get_application_state(ApplicationState::SupportedFeatures)
                .is_none()
            {
                let advertised = versioned_value::values::supported_features(
                    features.supported_feature_set().iter().map(String::as_str),
                );
                local_state.add_application_state(
                    ApplicationState::SupportedFeatures,
                    VersionedValue::new(advertised, self.versions.next()),
                );
            }
        }
        local_state
            .heartbeat_mut()
            .update_heartbeat(&self.versions);

        {
            let mut st = self.state.write();
            st.table.insert(self.local, local_state);
            st.started = true;
            if let Some(features) = &self.features {
                features.check_features(&st.table);
            }
        }
        self.stopped.send_replace(false);

        log::info!(
            endpoint = %self.local,
            generation,
            cluster = %self.config.cluster_name,
            "Gossip started"
        );
        Ok(generation)
    }

    /// Run gossip rounds every `interval` until `signal` fires or
    /// [`Gossiper::stop`] is called.
    #[instrument(fields(endpoint = %self.local), skip(self, signal))]
    pub async fn run(self: Arc<Self>, mut signal: watch::Receiver<()>) -> Result<()> {
        if !self.is_started() {
            return Err(GossipError::NotStarted.into());
        }
        let mut stopped = self.stopped.subscribe();
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut cnt: u64 = 0;

        loop {
            tokio::select! {
                _ = signal.changed() => {
                    log::info!("Gossiper {} is shutting down", self.local);
                    break;
                }
                _ = stopped.changed() => {
                    log::info!("Gossiper {} stopped", self.local);
                    break;
                }
                _ = interval.tick() => {
                    let outcomes = self.do_gossip_round().await;
                    log::debug!(
                        "Round {} finished: {} targets, {} completed",
                        cnt,
                        outcomes.len(),
                        outcomes.iter().filter(|(_, o)| o.is_completed()).count()
                    );
                    cnt += 1;
                }
            }
        }
        Ok(())
    }

    /// Announce shutdown to every live peer, then stop the scheduler.
    pub async fn stop(&self) {
        if !self.is_started() {
            return;
        }
        if let Err(e) = self.update_local_application_state(
            ApplicationState::Status,
            versioned_value::values::shutdown(true),
        ) {
            log::warn!("Failed to publish shutdown status: {}", e);
        }

        let peers: Vec<Endpoint> = self.state.read().live.iter().copied().collect();
        let rounds = peers.iter().map(|peer| {
            let syn = self.make_syn(*peer);
            self.gossip_with(*peer, syn)
        });
        if tokio::time::timeout(
            self.config.shutdown_announce(),
            futures::future::join_all(rounds),
        )
        .await
        .is_err()
        {
            log::warn!("Shutdown announcement did not finish in time");
        }

        self.state.write().started = false;
        self.stopped.send_replace(true);
        log::info!(endpoint = %self.local, "Gossip stopped, announced to {} peers", peers.len());
    }

    // ------------------------------------------------------------------
    // Round driver (initiator side)
    // ------------------------------------------------------------------

    /// One scheduled round: beat, pick targets, reconcile with each, then
    /// re-evaluate liveness.
    pub async fn do_gossip_round(&self) -> Vec<(Endpoint, RoundOutcome)> {
        if !self.is_started() {
            return Vec::new();
        }
        self.beat();

        let targets = self.select_targets();
        if targets.is_empty() {
            log::debug!("No peer available to gossip with");
        }

        let mut outcomes = Vec::with_capacity(targets.len());
        for peer in targets {
            let syn = self.make_syn(peer);
            let outcome = self.gossip_with(peer, syn).await;
            outcomes.push((peer, outcome));
        }

        self.status_check(now());
        outcomes
    }

    /// Drive the three phases against one peer. Never returns an error:
    /// failures are reported as the outcome and the next round retries.
    pub async fn gossip_with(&self, peer: Endpoint, syn: Syn) -> RoundOutcome {
        self.metrics.record_round_started();
        let timeout = self.config.rpc_timeout();

        log::debug!("Sending syn to {} with {} digests", peer, syn.digests.len());
        let ack = match tokio::time::timeout(timeout, self.transport.send_syn(peer, syn)).await {
            Err(_) => return self.round_timed_out(peer, RoundPhase::SynSent),
            Ok(Err(e)) => return self.round_failed(peer, RoundPhase::SynSent, e),
            Ok(Ok(ack)) => ack,
        };

        let ack2 = self.handle_ack(peer, ack);
        if ack2.endpoint_state_map.is_empty() {
            self.metrics.record_round_completed();
            return RoundOutcome::Completed;
        }

        match tokio::time::timeout(timeout, self.transport.send_ack2(peer, ack2)).await {
            Err(_) => self.round_timed_out(peer, RoundPhase::Ack2Sent),
            Ok(Err(e)) => self.round_failed(peer, RoundPhase::Ack2Sent, e),
            Ok(Ok(())) => {
                self.metrics.record_round_completed();
                RoundOutcome::Completed
            }
        }
    }

    fn round_timed_out(&self, peer: Endpoint, phase: RoundPhase) -> RoundOutcome {
        log::info!("Gossip round with {} timed out in {:?}", peer, phase);
        self.metrics.record_round_timed_out();
        RoundOutcome::TimedOut { phase }
    }

    fn round_failed(&self, peer: Endpoint, phase: RoundPhase, error: GossipError) -> RoundOutcome {
        log::info!("Gossip round with {} failed in {:?}: {}", peer, phase, error);
        self.metrics.record_round_failed();
        RoundOutcome::Failed {
            phase,
            reason: error.to_string(),
        }
    }

    /// Advance the local heartbeat.
    fn beat(&self) {
        let _serial = self.apply_guard.lock();
        let mut st = self.state.write();
        if let Some(local) = st.table.get_mut(&self.local) {
            local.heartbeat_mut().update_heartbeat(&self.versions);
        }
    }

    /// Digests for a Syn to `target`: our own first, then every reachable
    /// endpoint, stalest first. Dead endpoints are left out, except the
    /// target itself so an unreachable peer we probe can answer with its
    /// own newer state.
    pub fn make_syn(&self, target: Endpoint) -> Syn {
        let st = self.state.read();
        let mut others: Vec<GossipDigest> = st
            .table
            .iter()
            .filter(|(ep, _)| **ep != self.local)
            .filter(|(ep, _)| !st.unreachable.contains(*ep) || **ep == target)
            .map(|(ep, state)| GossipDigest::from_state(*ep, state))
            .collect();
        sort_stalest_first(&mut others);

        let mut digests = Vec::with_capacity(others.len() + 1);
        if let Some(own) = st.table.digest(&self.local) {
            digests.push(own);
        }
        digests.extend(others);

        Syn {
            cluster_id: self.config.cluster_name.clone(),
            partitioner: self.config.partitioner.clone(),
            digests,
        }
    }

    /// One random live peer per fanout slot, maybe an unreachable one, and
    /// maybe a seed.
    fn select_targets(&self) -> Vec<Endpoint> {
        let st = self.state.read();
        let live: Vec<Endpoint> = st.live.iter().copied().collect();
        let unreachable: Vec<Endpoint> = st.unreachable.iter().copied().collect();
        drop(st);

        let mut rng = rand::rng();
        let mut targets: Vec<Endpoint> = live
            .choose_multiple(&mut rng, self.config.fanout)
            .copied()
            .collect();

        if !unreachable.is_empty() {
            let probability = unreachable.len() as f64 / (live.len() + 1) as f64;
            if rng.random::<f64>() < probability {
                if let Some(ep) = unreachable.choose(&mut rng) {
                    targets.push(*ep);
                }
            }
        }

        let seeds: Vec<Endpoint> = self
            .config
            .seeds
            .iter()
            .filter(|s| **s != self.local)
            .copied()
            .collect();
        if !seeds.is_empty() {
            let reached_seed = targets.iter().any(|t| seeds.contains(t));
            if !reached_seed || live.len() < seeds.len() {
                let pick = if live.is_empty() {
                    true
                } else {
                    let probability =
                        seeds.len() as f64 / (live.len() + unreachable.len()) as f64;
                    rng.random::<f64>() <= probability
                };
                if pick {
                    if let Some(seed) = seeds.choose(&mut rng) {
                        targets.push(*seed);
                    }
                }
            }
        }

        let mut seen = BTreeSet::new();
        targets.retain(|t| seen.insert(*t));
        targets
    }

    // ------------------------------------------------------------------
    // Message handlers
    // ------------------------------------------------------------------

    /// Receiver side of a Syn. Read-only: compares digests and answers with
    /// newer full states and requests for the rest.
    pub fn handle_syn(&self, from: Endpoint, syn: Syn) -> GossipResult<Ack> {
        if !self.is_started() {
            log::debug!("Ignoring syn from {}: gossip is not running", from);
            return Err(GossipError::NotStarted);
        }
        if syn.cluster_id != self.config.cluster_name {
            log::warn!(
                "Rejecting syn from {}: cluster '{}' is not '{}'",
                from,
                syn.cluster_id,
                self.config.cluster_name
            );
            return Err(GossipError::ClusterNameMismatch {
                from,
                expected: self.config.cluster_name.clone(),
                actual: syn.cluster_id,
            });
        }
        if !syn.partitioner.is_empty()
            && !self.config.partitioner.is_empty()
            && syn.partitioner != self.config.partitioner
        {
            log::warn!(
                "Rejecting syn from {}: partitioner '{}' is not '{}'",
                from,
                syn.partitioner,
                self.config.partitioner
            );
            return Err(GossipError::PartitionerMismatch {
                from,
                expected: self.config.partitioner.clone(),
                actual: syn.partitioner,
            });
        }

        let st = self.state.read();
        let mut ack = Ack::default();
        for digest in syn.digests {
            if let Err(e) = digest.validate() {
                self.reject_malformed(from, e);
                continue;
            }
            if st.is_quarantined(&digest.endpoint) {
                log::debug!("Ignoring digest for quarantined endpoint {}", digest.endpoint);
                continue;
            }
            match st.table.get(&digest.endpoint) {
                None => ack
                    .digest_list
                    .push(GossipDigest::new(digest.endpoint, digest.generation, 0)),
                Some(state) => {
                    if generation_too_far_ahead(state.generation(), digest.generation) {
                        self.reject_malformed(
                            from,
                            GossipError::malformed(
                                digest.endpoint,
                                format!(
                                    "generation {} too far ahead of {}",
                                    digest.generation,
                                    state.generation()
                                ),
                            ),
                        );
                        continue;
                    }
                    let local = GossipDigest::from_state(digest.endpoint, state);
                    match local.freshness_cmp(&digest) {
                        std::cmp::Ordering::Greater => {
                            ack.endpoint_state_map.insert(digest.endpoint, state.clone());
                        }
                        std::cmp::Ordering::Less => ack.digest_list.push(local),
                        std::cmp::Ordering::Equal => {}
                    }
                }
            }
        }

        log::debug!(
            "Ack to {}: requesting {} endpoints, sending {} states",
            from,
            ack.digest_list.len(),
            ack.endpoint_state_map.len()
        );
        Ok(ack)
    }

    /// Initiator side of an Ack: merge what the peer sent, then answer its
    /// requests. Endpoints we no longer know are left out of the answer.
    pub fn handle_ack(&self, from: Endpoint, ack: Ack) -> Ack2 {
        self.apply_state_from(from, ack.endpoint_state_map);

        let st = self.state.read();
        let mut ack2 = Ack2::default();
        for digest in ack.digest_list {
            if let Err(e) = digest.validate() {
                self.reject_malformed(from, e);
                continue;
            }
            match st.table.get(&digest.endpoint) {
                Some(state) => {
                    ack2.endpoint_state_map.insert(digest.endpoint, state.clone());
                }
                None => log::debug!(
                    "{} requested unknown endpoint {}, omitting",
                    from,
                    digest.endpoint
                ),
            }
        }
        ack2
    }

    /// Receiver side of an Ack2.
    pub fn handle_ack2(&self, from: Endpoint, ack2: Ack2) {
        log::debug!(
            "Applying ack2 from {} with {} states",
            from,
            ack2.endpoint_state_map.len()
        );
        self.apply_state_from(from, ack2.endpoint_state_map);
    }

    fn reject_malformed(&self, from: Endpoint, error: GossipError) {
        log::warn!("Dropping malformed entry from {}: {}", from, error);
        self.metrics.record_malformed();
    }

    // ------------------------------------------------------------------
    // Merge application
    // ------------------------------------------------------------------

    /// Merge received states one endpoint at a time, notifying subscribers
    /// as each endpoint is applied.
    pub fn apply_state_locally(&self, states: BTreeMap<Endpoint, EndpointState>) {
        self.apply_states(states);
    }

    /// Like [`Gossiper::apply_state_locally`], but the sender's own state is
    /// reconciled before anything it relays about other endpoints.
    fn apply_state_from(&self, from: Endpoint, mut states: BTreeMap<Endpoint, EndpointState>) {
        let sender = states.remove_entry(&from);
        self.apply_states(sender.into_iter().chain(states));
    }

    fn apply_states(&self, states: impl IntoIterator<Item = (Endpoint, EndpointState)>) {
        let _serial = self.apply_guard.lock();
        let mut features_changed = false;

        for (endpoint, remote) in states {
            if endpoint == self.local {
                continue;
            }
            if self.state.read().is_quarantined(&endpoint) {
                log::debug!("Ignoring state for quarantined endpoint {}", endpoint);
                continue;
            }
            if let Err(e) = remote.validate(endpoint) {
                self.reject_malformed(endpoint, e);
                continue;
            }
            features_changed |= self.apply_remote_state(endpoint, remote);
        }

        if features_changed {
            if let Some(features) = &self.features {
                features.check_features(&self.state.read().table);
            }
        }
        self.publish_membership_gauges();
    }

    /// Returns whether SUPPORTED_FEATURES changed.
    fn apply_remote_state(&self, endpoint: Endpoint, remote: EndpointState) -> bool {
        let now = now();
        let local = self.state.read().table.get(&endpoint).cloned();

        let Some(local) = local else {
            log::info!("Node {} has joined with generation {}", endpoint, remote.generation());
            let features = remote
                .get_application_state(ApplicationState::SupportedFeatures)
                .is_some();
            let shutdown = remote.is_shutdown();
            self.state.write().table.insert(endpoint, remote.clone());
            self.metrics.record_state_applied();
            self.subscribers.dispatch(&[GossipEvent::Join {
                endpoint,
                state: remote.clone(),
            }]);
            self.after_progress(endpoint, &remote, shutdown, now);
            return features;
        };

        if generation_too_far_ahead(local.generation(), remote.generation()) {
            self.reject_malformed(
                endpoint,
                GossipError::malformed(
                    endpoint,
                    format!(
                        "generation {} too far ahead of {}",
                        remote.generation(),
                        local.generation()
                    ),
                ),
            );
            return false;
        }

        let merged = merge(&local, &remote);
        match merged.kind {
            MergeKind::Stale => {
                log::debug!(
                    "Ignoring stale state for {}: generation {} < {}",
                    endpoint,
                    remote.generation(),
                    local.generation()
                );
                self.metrics.record_stale_ignored();
                false
            }
            MergeKind::Unchanged => false,
            MergeKind::Restarted => {
                log::info!(
                    "Node {} has restarted, generation {} -> {}",
                    endpoint,
                    local.generation(),
                    merged.state.generation()
                );
                if !self.commit(endpoint, merged.state.clone()) {
                    return false;
                }
                let mut events = vec![GossipEvent::Restart {
                    endpoint,
                    state: merged.state.clone(),
                }];
                events.extend(change_events(endpoint, &merged.state, &merged.changed));
                self.subscribers.dispatch(&events);
                self.after_progress(endpoint, &merged.state, merged.state.is_shutdown(), now);
                merged.changed.contains(&ApplicationState::SupportedFeatures)
            }
            MergeKind::Updated => {
                let before: Vec<GossipEvent> = merged
                    .changed
                    .iter()
                    .filter_map(|key| {
                        merged
                            .state
                            .get_application_state(*key)
                            .map(|value| GossipEvent::BeforeChange {
                                endpoint,
                                current: local.clone(),
                                key: *key,
                                new_value: value.clone(),
                            })
                    })
                    .collect();
                self.subscribers.dispatch(&before);

                if !self.commit(endpoint, merged.state.clone()) {
                    return false;
                }
                self.subscribers
                    .dispatch(&change_events(endpoint, &merged.state, &merged.changed));

                // A node that announced shutdown stays down until it restarts.
                let shutdown = merged.state.is_shutdown();
                let status_changed = merged.changed.contains(&ApplicationState::Status);
                if merged.heartbeat_advanced || (shutdown && status_changed) {
                    self.after_progress(endpoint, &merged.state, shutdown, now);
                }
                merged.changed.contains(&ApplicationState::SupportedFeatures)
            }
        }
    }

    /// Store a merged state. Refuses if the endpoint was removed while
    /// subscribers were being notified.
    fn commit(&self, endpoint: Endpoint, state: EndpointState) -> bool {
        let mut st = self.state.write();
        if !st.table.contains(&endpoint) {
            log::debug!("Endpoint {} removed during merge, dropping update", endpoint);
            return false;
        }
        st.table.insert(endpoint, state);
        self.metrics.record_state_applied();
        true
    }

    /// Liveness bookkeeping after an endpoint showed progress.
    fn after_progress(&self, endpoint: Endpoint, state: &EndpointState, shutdown: bool, now: Instant) {
        if shutdown {
            log::info!("Node {} announced shutdown", endpoint);
            self.mark_dead(endpoint, state);
            return;
        }
        self.failure_detector.report(endpoint, now);
        self.mark_alive(endpoint, state);
    }

    fn mark_alive(&self, endpoint: Endpoint, state: &EndpointState) {
        let changed = {
            let mut st = self.state.write();
            st.unreachable.remove(&endpoint);
            st.live.insert(endpoint)
        };
        if changed {
            log::info!("InetAddress {} is now UP, status = {}", endpoint, state.status());
            self.subscribers.dispatch(&[GossipEvent::Alive {
                endpoint,
                state: state.clone(),
            }]);
        }
    }

    fn mark_dead(&self, endpoint: Endpoint, state: &EndpointState) {
        let changed = {
            let mut st = self.state.write();
            let was_live = st.live.remove(&endpoint);
            let newly_unreachable = st.unreachable.insert(endpoint);
            was_live || newly_unreachable
        };
        if changed {
            log::info!("InetAddress {} is now DOWN, status = {}", endpoint, state.status());
            self.subscribers.dispatch(&[GossipEvent::Dead {
                endpoint,
                state: state.clone(),
            }]);
        }
    }

    /// Mark live endpoints dead when the failure detector gives up on them,
    /// and release expired quarantines.
    pub fn status_check(&self, now: Instant) {
        let _serial = self.apply_guard.lock();

        let expired: Vec<(Endpoint, EndpointState)> = {
            let mut st = self.state.write();
            let quarantine = self.config.quarantine_delay();
            st.just_removed
                .retain(|_, removed_at| now.saturating_duration_since(*removed_at) < quarantine);

            st.live
                .iter()
                .filter(|ep| !self.failure_detector.is_alive(**ep, now))
                .filter_map(|ep| st.table.get(ep).map(|s| (*ep, s.clone())))
                .collect()
        };

        for (endpoint, state) in expired {
            self.mark_dead(endpoint, &state);
        }
        self.publish_membership_gauges();
    }

    fn publish_membership_gauges(&self) {
        let st = self.state.read();
        self.metrics.set_membership(st.live.len(), st.unreachable.len());
    }

    // ------------------------------------------------------------------
    // Local state
    // ------------------------------------------------------------------

    /// Publish a new value for a local key. It goes out with the next round.
    pub fn update_local_application_state(
        &self,
        key: ApplicationState,
        value: impl Into<String>,
    ) -> GossipResult<()> {
        self.add_local_application_states([(key, value.into())])
    }

    /// Publish several local keys, each with its own fresh version.
    pub fn add_local_application_states(
        &self,
        values: impl IntoIterator<Item = (ApplicationState, String)>,
    ) -> GossipResult<()> {
        let _serial = self.apply_guard.lock();
        let mut features_changed = false;

        for (key, value) in values {
            let current = self
                .state
                .read()
                .table
                .get(&self.local)
                .cloned()
                .ok_or(GossipError::NotStarted)?;
            let new_value = VersionedValue::new(value, self.versions.next());

            self.subscribers.dispatch(&[GossipEvent::BeforeChange {
                endpoint: self.local,
                current,
                key,
                new_value: new_value.clone(),
            }]);
            {
                let mut st = self.state.write();
                let local = st.table.get_mut(&self.local).ok_or(GossipError::NotStarted)?;
                local.add_application_state(key, new_value.clone());
            }
            self.subscribers.dispatch(&[GossipEvent::Change {
                endpoint: self.local,
                key,
                value: new_value,
            }]);
            features_changed |= key == ApplicationState::SupportedFeatures;
        }

        if features_changed {
            if let Some(features) = &self.features {
                features.check_features(&self.state.read().table);
            }
        }
        Ok(())
    }

    /// Drop an endpoint from membership and ignore gossip about it for the
    /// quarantine delay.
    pub fn remove_endpoint(&self, endpoint: Endpoint) {
        if endpoint == self.local {
            log::warn!("Refusing to remove the local endpoint {}", endpoint);
            return;
        }
        let _serial = self.apply_guard.lock();
        let existed = {
            let mut st = self.state.write();
            st.live.remove(&endpoint);
            st.unreachable.remove(&endpoint);
            st.just_removed.insert(endpoint, now());
            st.table.remove(&endpoint).is_some()
        };
        self.failure_detector.remove(endpoint);
        if existed {
            log::info!("Removed endpoint {}", endpoint);
            self.subscribers.dispatch(&[GossipEvent::Remove { endpoint }]);
        }
        self.publish_membership_gauges();
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn register_subscriber(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.subscribers.register(subscriber)
    }

    pub fn unregister_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers.unregister(id)
    }

    pub fn get_endpoint_state(&self, endpoint: Endpoint) -> Option<EndpointState> {
        self.state.read().table.get(&endpoint).cloned()
    }

    pub fn get_application_state(&self, endpoint: Endpoint, key: ApplicationState) -> Option<String> {
        self.state
            .read()
            .table
            .get_application_state(&endpoint, key)
            .map(|v| v.value.clone())
    }

    pub fn current_generation(&self, endpoint: Endpoint) -> Option<i32> {
        self.state
            .read()
            .table
            .get(&endpoint)
            .map(EndpointState::generation)
    }

    /// Run `f` against the table. The reference must not escape the call.
    pub fn with_table<R>(&self, f: impl FnOnce(&EndpointStateTable) -> R) -> R {
        f(&self.state.read().table)
    }

    pub fn snapshot(&self) -> BTreeMap<Endpoint, EndpointState> {
        self.state.read().table.snapshot()
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.state.read().table.endpoints().collect()
    }

    /// Live members including the local endpoint.
    pub fn live_members(&self) -> BTreeSet<Endpoint> {
        let st = self.state.read();
        let mut live = st.live.clone();
        if st.started {
            live.insert(self.local);
        }
        live
    }

    pub fn unreachable_members(&self) -> BTreeSet<Endpoint> {
        self.state.read().unreachable.clone()
    }

    pub fn is_alive(&self, endpoint: Endpoint) -> bool {
        if endpoint == self.local {
            return self.is_started();
        }
        self.state.read().live.contains(&endpoint)
    }

    pub fn is_quarantined(&self, endpoint: Endpoint) -> bool {
        self.state.read().is_quarantined(&endpoint)
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn generation_too_far_ahead(local_generation: i32, remote_generation: i32) -> bool {
    i64::from(remote_generation) > i64::from(local_generation) + MAX_GENERATION_DIFFERENCE
}

fn change_events(
    endpoint: Endpoint,
    state: &EndpointState,
    keys: &[ApplicationState],
) -> Vec<GossipEvent> {
    keys.iter()
        .filter_map(|key| {
            state
                .get_application_state(*key)
                .map(|value| GossipEvent::Change {
                    endpoint,
                    key: *key,
                    value: value.clone(),
                })
        })
        .collect()
}
