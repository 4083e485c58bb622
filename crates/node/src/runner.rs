//! Production runner: the tokio event loop around the node state machine.
//!
//! Inbound events (network frames, RPC submissions, timer fires) land on one
//! bounded mpsc queue. The loop is the only consumer and the only mutator of
//! node state; it processes each event to completion, executing the actions
//! it returns, before taking the next. Producers never block: a full queue
//! drops the message, which is the transport's best-effort semantics anyway.

use crate::codec;
use crate::metrics::METRICS;
use crate::network::{Network, Recipient};
use crate::state::NodeStateMachine;
use crate::storage::ChainStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_consensus::ChainSnapshot;
use tessera_core::{Action, ChannelId, Event, StateMachine, TimerId};
use tessera_types::Block;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Default inbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;

/// Manages timers for the production runner.
///
/// Each timer is a tokio task that sleeps for the specified duration and
/// then sends the timer event into the main queue. Setting a timer with the
/// same id replaces the previous one.
struct TimerManager {
    timers: HashMap<TimerId, JoinHandle<()>>,
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            timers: HashMap::new(),
            event_tx,
        }
    }

    fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let event = match id {
                TimerId::Epoch => Event::EpochTimer,
            };
            // The queue owner went away; nothing to do.
            let _ = event_tx.send(event).await;
        });
        self.timers.insert(id, handle);
        trace!(?id, ?duration, "Timer set");
    }

    fn cancel_timer(&mut self, id: TimerId) {
        if let Some(handle) = self.timers.remove(&id) {
            handle.abort();
            trace!(?id, "Timer cancelled");
        }
    }

    fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Inbound side of the transport: decodes frames and enqueues events.
///
/// Registered with the network collaborator as its delivery callback. Never
/// blocks; malformed frames and queue overflow are counted and dropped.
#[derive(Clone)]
pub struct InboundHandle {
    event_tx: mpsc::Sender<Event>,
}

impl InboundHandle {
    /// Deliver one length-delimited frame received on `channel`.
    pub fn deliver(&self, channel: ChannelId, bytes: &[u8]) {
        let event = match codec::decode_message(channel, bytes) {
            Ok(event) => event,
            Err(e) => {
                debug!(channel = channel.as_str(), error = %e, "Dropping malformed frame");
                METRICS.malformed_messages.inc();
                return;
            }
        };
        if self.event_tx.try_send(event).is_err() {
            METRICS.queue_full_drops.inc();
        }
    }
}

/// Control surface handed to RPC and the embedding process.
#[derive(Clone)]
pub struct NodeHandle {
    event_tx: mpsc::Sender<Event>,
    snapshot: Arc<RwLock<ChainSnapshot>>,
    shutdown_tx: watch::Sender<bool>,
}

impl NodeHandle {
    /// Enqueue a client-submitted transaction. Returns false if the queue
    /// was full.
    pub fn submit_transaction(&self, raw: Vec<u8>) -> bool {
        if self
            .event_tx
            .try_send(Event::TransactionSubmitted { raw })
            .is_err()
        {
            METRICS.queue_full_drops.inc();
            return false;
        }
        true
    }

    /// The latest engine-published chain snapshot.
    pub fn snapshot(&self) -> ChainSnapshot {
        self.snapshot.read().clone()
    }

    /// Ask the runner to stop after the event in flight.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The production runner.
pub struct NodeRunner<N: Network, S: ChainStore> {
    node: NodeStateMachine,
    network: Arc<N>,
    storage: S,
    event_tx: mpsc::Sender<Event>,
    event_rx: mpsc::Receiver<Event>,
    timers: TimerManager,
    snapshot: Arc<RwLock<ChainSnapshot>>,
    finalized_tx: mpsc::Sender<Block>,
    shutdown_rx: watch::Receiver<bool>,
    started: Instant,
}

impl<N: Network, S: ChainStore> NodeRunner<N, S> {
    /// Build a runner. Returns the runner, its control handle, the inbound
    /// delivery handle for the transport, and the advisory finalized-block
    /// stream.
    pub fn new(
        node: NodeStateMachine,
        network: Arc<N>,
        storage: S,
        queue_capacity: usize,
    ) -> (Self, NodeHandle, InboundHandle, mpsc::Receiver<Block>) {
        let (event_tx, event_rx) = mpsc::channel(queue_capacity);
        let (finalized_tx, finalized_rx) = mpsc::channel(queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let snapshot = Arc::new(RwLock::new(node.snapshot()));

        let handle = NodeHandle {
            event_tx: event_tx.clone(),
            snapshot: snapshot.clone(),
            shutdown_tx,
        };
        let inbound = InboundHandle {
            event_tx: event_tx.clone(),
        };
        let timers = TimerManager::new(event_tx.clone());

        let runner = Self {
            node,
            network,
            storage,
            event_tx,
            event_rx,
            timers,
            snapshot,
            finalized_tx,
            shutdown_rx,
            started: Instant::now(),
        };
        (runner, handle, inbound, finalized_rx)
    }

    /// Run until shutdown. Consumes the runner.
    pub async fn run(mut self) {
        info!("Node runner starting");
        let initial = self.node.initialize();
        self.execute(initial);

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    // Either an explicit shutdown or every handle dropped.
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                event = self.event_rx.recv() => {
                    let Some(event) = event else { break };
                    self.node.set_time(self.started.elapsed());
                    trace!(event = event.type_name(), "Processing event");
                    let actions = self.node.handle(event);
                    self.execute(actions);
                    self.publish_snapshot();
                }
            }
        }

        self.timers.cancel_all();
        info!("Node runner stopped");
    }

    /// Execute actions in order. Internal events are processed depth-first,
    /// before any later action, preserving causality.
    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast { channel, message } => match codec::encode_message(&message) {
                    Ok(bytes) => self.network.send(Recipient::Broadcast, channel, bytes),
                    Err(e) => warn!(error = %e, "Failed to encode broadcast"),
                },
                Action::SendToValidator {
                    validator,
                    channel,
                    message,
                } => match codec::encode_message(&message) {
                    Ok(bytes) => {
                        self.network
                            .send(Recipient::Validator(validator), channel, bytes)
                    }
                    Err(e) => warn!(error = %e, "Failed to encode unicast"),
                },
                Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
                Action::CancelTimer { id } => self.timers.cancel_timer(id),
                Action::EnqueueInternal { event } => {
                    let more = self.node.handle(event);
                    self.execute(more);
                }
                Action::EmitFinalizedBlock { block } => {
                    METRICS.finalized_blocks.inc();
                    if self.finalized_tx.try_send(block).is_err() {
                        // Advisory stream: consumers catch up via the tree.
                        METRICS.finalized_stream_drops.inc();
                    }
                }
                Action::PersistBlock { block } => {
                    if let Err(e) = self.storage.put_block(&block) {
                        warn!(error = %e, block = ?block.hash(), "Failed to persist block");
                    }
                }
                Action::PersistOwnVote { epoch } => {
                    if let Err(e) = self.storage.set_last_vote_epoch(epoch) {
                        warn!(error = %e, epoch, "Failed to persist vote epoch");
                    }
                }
                Action::PersistChainState {
                    highest_certified,
                    last_finalized,
                } => {
                    if let Err(e) = self
                        .storage
                        .set_chain_state(highest_certified, last_finalized)
                    {
                        warn!(error = %e, "Failed to persist chain state");
                    }
                }
            }
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = self.node.snapshot();
        METRICS.finalized_height.set(snapshot.last_finalized_height as i64);
        METRICS.local_epoch.set(snapshot.epoch as i64);
        METRICS.mempool_size.set(self.node.mempool().len() as i64);
        *self.snapshot.write() = snapshot;
    }

    /// The queue sender, for wiring additional producers.
    pub fn event_sender(&self) -> mpsc::Sender<Event> {
        self.event_tx.clone()
    }
}
