//! Deterministic simulation runner.
//!
//! Holds every node's state machine, a global time-ordered event queue, and
//! the simulated network. Processes events one at a time across the whole
//! network; actions a node returns are executed immediately (messages
//! scheduled for delivery, timers registered, internal events re-queued at
//! the current instant with Internal priority).

use crate::event_queue::EventKey;
use crate::network::{NetworkConfig, SimulatedNetwork};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tessera_consensus::{ConsensusConfig, EngineState, RecoveredState};
use tessera_core::{Action, Event, OutboundMessage, StateMachine, TimerId};
use tessera_mempool::{MempoolConfig, MempoolState};
use tessera_node::NodeStateMachine;
use tessera_types::{Address, Block, Hash, KeyPair, Validator, ValidatorSet, Vote};
use tracing::trace;

/// Index of a node in the simulation.
pub type NodeIndex = u32;

/// Chain identifier used by every simulated network.
const CHAIN_ID: &str = "sim";

/// Per-node stand-in for the persistence layer.
#[derive(Debug, Clone, Default)]
pub struct SimStorage {
    pub blocks: Vec<Block>,
    pub last_vote_epoch: u64,
    pub highest_certified: Option<Hash>,
    pub last_finalized: Option<Hash>,
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    pub events_processed: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub timers_set: u64,
}

/// Deterministic multi-node simulation.
pub struct SimulationRunner {
    nodes: Vec<NodeStateMachine>,
    keys: Vec<KeyPair>,
    validators: ValidatorSet,
    address_index: HashMap<Address, NodeIndex>,

    queue: BTreeMap<EventKey, (NodeIndex, Event)>,
    sequence: u64,
    now: Duration,

    network: SimulatedNetwork,
    rng: ChaCha8Rng,
    /// Pending timer events, for replacement on SetTimer.
    timers: HashMap<(NodeIndex, TimerId), EventKey>,

    /// Per-node log of finalized blocks, in finalization order.
    finalized: Vec<Vec<Block>>,
    /// Every vote each node put on the wire, for protocol assertions.
    vote_log: Vec<Vec<Vote>>,
    storage: Vec<SimStorage>,
    stats: SimulationStats,
}

impl SimulationRunner {
    /// Create a simulation with `network.num_validators` equal-stake nodes.
    ///
    /// Keys are derived deterministically from `seed`, so the same seed
    /// always produces the same validator set and the same run.
    pub fn new(network: NetworkConfig, consensus: ConsensusConfig, seed: u64) -> Self {
        let num = network.num_validators;
        let keys: Vec<KeyPair> = (0..num)
            .map(|i| {
                let mut seed_bytes = [0u8; 32];
                let key_seed = seed.wrapping_add(i as u64).wrapping_mul(0x517cc1b727220a95);
                seed_bytes[..8].copy_from_slice(&key_seed.to_le_bytes());
                seed_bytes[8..16].copy_from_slice(&(i as u64).to_le_bytes());
                KeyPair::from_seed(&seed_bytes)
            })
            .collect();

        let validators = ValidatorSet::new(
            keys.iter()
                .map(|k| Validator::new(k.public_key(), 1))
                .collect(),
        );
        let address_index = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.address(), i as NodeIndex))
            .collect();

        let nodes: Vec<NodeStateMachine> = keys
            .iter()
            .map(|key| {
                let engine = EngineState::new(
                    CHAIN_ID,
                    key.clone(),
                    validators.clone(),
                    consensus.clone(),
                    RecoveredState::default(),
                );
                NodeStateMachine::new(engine, MempoolState::new(MempoolConfig::default()))
            })
            .collect();

        let num_nodes = nodes.len();
        Self {
            nodes,
            keys,
            validators,
            address_index,
            queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network: SimulatedNetwork::new(network),
            rng: ChaCha8Rng::seed_from_u64(seed),
            timers: HashMap::new(),
            finalized: vec![Vec::new(); num_nodes],
            vote_log: vec![Vec::new(); num_nodes],
            storage: vec![SimStorage::default(); num_nodes],
            stats: SimulationStats::default(),
        }
    }

    /// Start every node: arms the initial epoch timers.
    pub fn start(&mut self) {
        for index in 0..self.nodes.len() {
            let actions = self.nodes[index].initialize();
            self.execute(index as NodeIndex, actions);
        }
    }

    // ─── Accessors ───

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn node(&self, index: NodeIndex) -> &NodeStateMachine {
        &self.nodes[index as usize]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn key(&self, index: NodeIndex) -> &KeyPair {
        &self.keys[index as usize]
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    /// Blocks node `index` has finalized, in order.
    pub fn finalized(&self, index: NodeIndex) -> &[Block] {
        &self.finalized[index as usize]
    }

    /// Votes node `index` has put on the wire.
    pub fn votes_sent(&self, index: NodeIndex) -> &[Vote] {
        &self.vote_log[index as usize]
    }

    pub fn sim_storage(&self, index: NodeIndex) -> &SimStorage {
        &self.storage[index as usize]
    }

    /// The node index of the leader of `epoch`.
    pub fn leader_of(&self, epoch: u64) -> NodeIndex {
        use tessera_consensus::{LeaderSchedule, RoundRobinStakeSchedule};
        let leader = RoundRobinStakeSchedule.leader(&self.validators, epoch).address;
        self.address_index[&leader]
    }

    // ─── Driving ───

    /// Schedule an event for a node after `delay`.
    pub fn inject_event(&mut self, node: NodeIndex, delay: Duration, event: Event) {
        self.schedule(node, self.now + delay, event);
    }

    /// Submit a raw transaction to one node's mempool.
    pub fn submit_transaction(&mut self, node: NodeIndex, raw: Vec<u8>) {
        self.inject_event(node, Duration::ZERO, Event::TransactionSubmitted { raw });
    }

    /// Process events until the simulated clock reaches `deadline`.
    pub fn run_until(&mut self, deadline: Duration) {
        loop {
            let Some((&key, _)) = self.queue.iter().next() else {
                break;
            };
            if key.time > deadline {
                break;
            }
            let Some((node, event)) = self.queue.remove(&key) else {
                continue;
            };
            self.now = key.time;

            // The fired timer is no longer pending.
            if matches!(event, Event::EpochTimer) {
                self.timers.remove(&(node, TimerId::Epoch));
            }

            trace!(node, event = event.type_name(), at = ?self.now, "Dispatching");
            self.nodes[node as usize].set_time(self.now);
            let actions = self.nodes[node as usize].handle(event);
            self.execute(node, actions);
            self.stats.events_processed += 1;
        }
        self.now = deadline;
    }

    // ─── Internals ───

    fn schedule(&mut self, node: NodeIndex, time: Duration, event: Event) -> EventKey {
        let key = EventKey {
            time,
            priority: event.priority(),
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.queue.insert(key, (node, event));
        key
    }

    fn execute(&mut self, node: NodeIndex, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast { message, .. } => {
                    if let OutboundMessage::Vote(vote) = &message {
                        self.vote_log[node as usize].push(vote.clone());
                    }
                    for peer in 0..self.network.total_nodes() as NodeIndex {
                        if peer == node {
                            continue;
                        }
                        match self.network.should_deliver(node, peer, &mut self.rng) {
                            Some(latency) => {
                                let event = Self::inbound_event(&message);
                                self.schedule(peer, self.now + latency, event);
                                self.stats.messages_sent += 1;
                            }
                            None => self.stats.messages_dropped += 1,
                        }
                    }
                }
                Action::SendToValidator {
                    validator, message, ..
                } => {
                    let Some(&peer) = self.address_index.get(&validator) else {
                        continue;
                    };
                    if peer == node {
                        continue;
                    }
                    match self.network.should_deliver(node, peer, &mut self.rng) {
                        Some(latency) => {
                            let event = Self::inbound_event(&message);
                            self.schedule(peer, self.now + latency, event);
                            self.stats.messages_sent += 1;
                        }
                        None => self.stats.messages_dropped += 1,
                    }
                }
                Action::SetTimer { id, duration } => {
                    // Replace any pending timer with the same id.
                    if let Some(old) = self.timers.remove(&(node, id)) {
                        self.queue.remove(&old);
                    }
                    let key = self.schedule(node, self.now + duration, Event::EpochTimer);
                    self.timers.insert((node, id), key);
                    self.stats.timers_set += 1;
                }
                Action::CancelTimer { id } => {
                    if let Some(old) = self.timers.remove(&(node, id)) {
                        self.queue.remove(&old);
                    }
                }
                Action::EnqueueInternal { event } => {
                    self.schedule(node, self.now, event);
                }
                Action::EmitFinalizedBlock { block } => {
                    self.finalized[node as usize].push(block);
                }
                Action::PersistBlock { block } => {
                    self.storage[node as usize].blocks.push(block);
                }
                Action::PersistOwnVote { epoch } => {
                    self.storage[node as usize].last_vote_epoch = epoch;
                }
                Action::PersistChainState {
                    highest_certified,
                    last_finalized,
                } => {
                    let storage = &mut self.storage[node as usize];
                    storage.highest_certified = Some(highest_certified);
                    storage.last_finalized = Some(last_finalized);
                }
            }
        }
    }

    fn inbound_event(message: &OutboundMessage) -> Event {
        match message {
            OutboundMessage::Proposal(proposal) => Event::ProposalReceived {
                proposal: proposal.clone(),
            },
            OutboundMessage::Vote(vote) => Event::VoteReceived { vote: vote.clone() },
            OutboundMessage::Transaction(raw) => Event::TransactionReceived { raw: raw.clone() },
        }
    }
}
