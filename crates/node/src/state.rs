//! Node state machine.

use std::time::Duration;
use tessera_consensus::{ChainSnapshot, EngineState};
use tessera_core::{Action, Event, StateMachine};
use tessera_mempool::MempoolState;

/// Combined node state machine.
///
/// Routes events between the consensus engine and the mempool. Holds all
/// mutable node state; the runner is the only caller.
pub struct NodeStateMachine {
    engine: EngineState,
    mempool: MempoolState,
    now: Duration,
}

impl NodeStateMachine {
    pub fn new(engine: EngineState, mempool: MempoolState) -> Self {
        Self {
            engine,
            mempool,
            now: Duration::ZERO,
        }
    }

    /// Initial actions: arm the engine's epoch clock.
    pub fn initialize(&self) -> Vec<Action> {
        self.engine.start()
    }

    pub fn engine(&self) -> &EngineState {
        &self.engine
    }

    pub fn mempool(&self) -> &MempoolState {
        &self.mempool
    }

    /// Copied chain view for external readers.
    pub fn snapshot(&self) -> ChainSnapshot {
        self.engine.snapshot()
    }
}

impl StateMachine for NodeStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            // The proposer reaps the mempool when an epoch opens, so timer
            // and certificate events carry the reaped view into the engine.
            Event::EpochTimer => {
                let max = self.engine.config().max_transactions_per_block;
                let transactions = self.mempool.reap(max);
                self.engine.on_epoch_timer(&transactions)
            }
            Event::CommitCertificateFormed {
                block_hash,
                certificate,
            } => {
                let max = self.engine.config().max_transactions_per_block;
                let transactions = self.mempool.reap(max);
                self.engine
                    .on_certificate_formed(block_hash, certificate, &transactions)
            }

            Event::ProposalReceived { proposal } => self.engine.on_proposal(proposal),
            Event::VoteReceived { vote } => self.engine.on_vote(vote),

            Event::TransactionSubmitted { raw } => self.mempool.on_transaction_submitted(raw),
            Event::TransactionReceived { raw } => self.mempool.on_transaction_received(raw),

            Event::BlockFinalized { block } => {
                self.mempool.on_block_finalized(&block);
                Vec::new()
            }
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.engine.set_time(now);
    }

    fn now(&self) -> Duration {
        self.now
    }
}

impl std::fmt::Debug for NodeStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStateMachine")
            .field("engine", &self.engine)
            .field("mempool_size", &self.mempool.len())
            .field("now", &self.now)
            .finish()
    }
}
