use std::sync::Arc;

use futures::future::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::checker::{self, CheckerContext, CheckerTarget};
use crate::config::NodeConfig;
use crate::consensus::ConsensusEvent;
use crate::crypto::{Address, KeyPair};
use crate::error::NodeResult;
use crate::finalize::Finalizer;
use crate::metrics::MetricsCollector;
use crate::network::message::Envelope;
use crate::network::{ConnectionManager, InboundMessage, NetworkClient};
use crate::pool::TransactionPool;
use crate::state_manager::{ISAACStateManager, PhaseTimeout, ProposerSelector};
use crate::storage::Store;
use crate::types::{Ballot, Round, Transaction, VotingHole, VotingPhase};

/// Composes every consensus component into the single actor that drives a
/// validator node: it owns the round/phase state, dispatches inbound messages
/// through the checker chains, and reacts to consensus events by broadcasting the
/// node's own vote or finalizing a block.
pub struct NodeRunner {
    config: NodeConfig,
    keypair: KeyPair,
    network_id: Vec<u8>,
    storage: Arc<dyn Store>,
    pool: Arc<TransactionPool>,
    state_manager: ISAACStateManager,
    finalizer: Finalizer,
    client: NetworkClient,
    connections: ConnectionManager,
    metrics: MetricsCollector,
    events: broadcast::Sender<Envelope>,
    current_round: Round,
    timeout_tx: mpsc::Sender<PhaseTimeout>,
}

impl NodeRunner {
    pub fn new(
        config: NodeConfig,
        keypair: KeyPair,
        storage: Arc<dyn Store>,
        proposer_selector: Box<dyn ProposerSelector>,
        timeout_tx: mpsc::Sender<PhaseTimeout>,
    ) -> NodeResult<Self> {
        let network_id = config.network_id.clone().into_bytes();
        let pool = Arc::new(TransactionPool::new(config.storage.max_pool_size));
        let state_manager = ISAACStateManager::new(&config, keypair.address(), proposer_selector);
        let common_account = Address::parse(&config.consensus.common_account)
            .unwrap_or_else(|_| keypair.address());
        let finalizer = Finalizer::new(crate::types::Amount::from_gon(config.consensus.base_fee), common_account);
        let client = NetworkClient::new(config.network.request_timeout(), config.network.connect_timeout())?;
        let connections = ConnectionManager::new(&config, client.clone());
        let (events, _) = broadcast::channel(256);
        let genesis_height = storage.latest_height()?;
        let current_round = Round::new(genesis_height + 1, 0, crate::types::Hash::zero());

        Ok(Self {
                config,
                keypair,
                network_id,
                storage,
                pool,
                state_manager,
                finalizer,
                client,
                connections,
                metrics: MetricsCollector::new(),
                events,
                current_round,
                timeout_tx,
        })
    }

    pub fn self_address(&self) -> Address {
        self.keypair.address()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn events(&self) -> broadcast::Sender<Envelope> {
        self.events.clone()
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// The ballot state machine's current phase for `round`, if it has one open.
    pub fn phase_of(&self, round: &Round) -> Option<VotingPhase> {
        self.state_manager.current_phase(round)
    }

    fn checker_context(&self, target: CheckerTarget) -> CheckerContext {
        CheckerContext {
            network_id: self.network_id.clone(),
            base_fee: self.finalizer.base_fee(),
            self_address: self.self_address(),
            validators: self.state_manager.validators().to_vec(),
            storage: self.storage.clone(),
            pool: self.pool.clone(),
            target,
            is_new_message: false,
            message_hash: None,
        }
    }

    /// Like `checker_context`, but precomputes `isNew` against the consensus engine's
    /// running tallies before the ballot chain runs, since the chain's plain function
    /// pointers have no way to reach the state manager themselves.
    fn checker_context_for_ballot(&self, ballot: Ballot) -> CheckerContext {
        let message_hash = ballot.message_hash();
        let is_new_message = self.state_manager.is_new_message(&ballot.round, &message_hash);
        CheckerContext {
            network_id: self.network_id.clone(),
            base_fee: self.finalizer.base_fee(),
            self_address: self.self_address(),
            validators: self.state_manager.validators().to_vec(),
            storage: self.storage.clone(),
            pool: self.pool.clone(),
            target: CheckerTarget::Ballot(ballot),
            is_new_message,
            message_hash: Some(message_hash),
        }
    }

    async fn broadcast_ballot(&self, ballot: &Ballot) -> NodeResult<()> {
        for peer in &self.config.validators {
            if let Err(err) = self.client.send_ballot(&peer.endpoint, ballot).await {
                warn!(peer = %peer.endpoint, error = %err, "failed to deliver ballot to peer");
            }
        }
        let _ = self.events.send(Envelope::ballot(ballot)?);
        Ok(())
    }

    /// Open a fresh round. If this node is the round's proposer, assemble a batch of
    /// pooled transactions, propose them, and broadcast the INIT ballot.
    pub async fn start_round(&mut self, round: Round) -> NodeResult<()> {
        self.current_round = round;
        self.metrics.consensus.record_round_started();
        self.state_manager.transit_state(round, VotingPhase::Init);
        self.state_manager
            .arm_phase_timer(round, VotingPhase::Init, self.timeout_tx.clone());

        if self.state_manager.is_self_proposer(&round, &self.self_address()) {
            let batch = self.pool.propose_batch(self.config.consensus.max_transactions_per_block);
            let proposed_hashes: Vec<_> = batch.iter().map(|t| t.hash()).collect();
            let account = self.storage.get_account(&self.self_address())?;
            let sequence_id = account.map(|a| a.next_sequence_id()).unwrap_or(0);

            let common_account = self.finalizer.common_account();
            let total_fee = batch.iter().try_fold(crate::types::Amount::zero(), |acc, tx| {
                acc.checked_add(tx.fee())
            });
            let mut operations = Vec::new();
            if let Some(total_fee) = total_fee {
                if total_fee > crate::types::Amount::zero() {
                    operations.push(crate::types::Operation::collect_tx_fee(common_account, total_fee));
                }
            } else {
                warn!(round = %round, "total proposed fee overflowed, omitting CollectTxFee operation");
            }
            let inflation = crate::types::Amount::from_gon(self.config.consensus.inflation_per_block_gon);
            if inflation > crate::types::Amount::zero() {
                operations.push(crate::types::Operation::inflation(common_account, inflation));
            }

            let proposer_tx = Transaction::new_signed(
                &self.keypair,
                &self.network_id,
                crate::types::Amount::zero(),
                sequence_id,
                operations,
            );
            let ballot = Ballot::new_proposal(&self.keypair, &self.network_id, round, proposed_hashes, proposer_tx);
            self.broadcast_ballot(&ballot).await?;
            // The proposer transits straight to SIGN once it has broadcast, rather than
            // waiting on its own INIT vote to cross the tally threshold.
            if self.state_manager.transit_state(round, VotingPhase::Sign) {
                self.state_manager
                    .arm_phase_timer(round, VotingPhase::Sign, self.timeout_tx.clone());
            }
            // Boxed to break the start_round/handle_ballot mutual-recursion cycle:
            // handle_ballot can itself call start_round on Aborted/ReadyToFinalize.
            self.handle_ballot(ballot).boxed().await?;
        }
        Ok(())
    }

    pub async fn handle_inbound(&mut self, message: InboundMessage) -> NodeResult<()> {
        match message {
            InboundMessage::Connect { node_id, endpoint } => {
                debug!(node_id, endpoint, "received connect handshake");
                if let Ok(address) = Address::parse(&node_id) {
                    self.connections.mark_ready(address);
                }
                Ok(())
            }
            InboundMessage::Transaction(tx) => self.handle_transaction(tx).await,
            InboundMessage::Ballot(ballot) => self.handle_ballot(ballot).await,
        }
    }

    async fn handle_transaction(&mut self, tx: Transaction) -> NodeResult<()> {
        let mut ctx = self.checker_context(CheckerTarget::Transaction(tx));
        checker::run_chain(&mut ctx, checker::transaction::CHAIN)?;
        let tx = match ctx.target {
            CheckerTarget::Transaction(tx) => tx,
            CheckerTarget::Ballot(_) => unreachable!(),
        };
        let mut batch = self.storage.new_batch();
        batch.put_pending_transaction(&tx)?;
        self.storage.commit(batch)?;
        self.pool.insert(tx)?;
        Ok(())
    }

    async fn handle_ballot(&mut self, ballot: Ballot) -> NodeResult<()> {
        let mut ctx = self.checker_context_for_ballot(ballot);
        checker::run_chain(&mut ctx, checker::ballot::CHAIN)?;
        let is_new = ctx.is_new_message;
        let ballot = match ctx.target {
            CheckerTarget::Ballot(ballot) => ballot,
            CheckerTarget::Transaction(_) => unreachable!(),
        };
        self.metrics.consensus.record_ballot_received();

        let event = self.state_manager.receive_ballot(&ballot)?;
        match event {
            ConsensusEvent::Recorded => {
                // First time this node has seen the message at all: echo agreement at
                // the same phase so the rest of the validator set's tallies can reach
                // quorum, rather than waiting for its own tally to close first. A
                // node never needs to echo its own vote back to itself.
                if is_new && ballot.sender_address != self.self_address() {
                    let own_vote = ballot.derive(&self.keypair, &self.network_id, ballot.phase, VotingHole::Yes);
                    self.broadcast_ballot(&own_vote).await?;
                    self.handle_ballot(own_vote).boxed().await?;
                }
            }
            ConsensusEvent::PhaseClosed {
                round,
                vote,
                next_phase: Some(next_phase),
                ..
            } => {
                // `transit_state` no-ops if a local timeout already advanced this round
                // past `next_phase`; only broadcast when the quorum tally is the one
                // actually moving the phase forward.
                if self.state_manager.transit_state(round, next_phase) {
                    self.state_manager
                        .arm_phase_timer(round, next_phase, self.timeout_tx.clone());
                    let vote = if next_phase == VotingPhase::Sign {
                        self.revalidate_for_sign(&round)
                    } else {
                        vote
                    };
                    let own_vote = ballot.derive(&self.keypair, &self.network_id, next_phase, vote);
                    self.broadcast_ballot(&own_vote).await?;
                    self.handle_ballot(own_vote).boxed().await?;
                }
            }
            ConsensusEvent::PhaseClosed { next_phase: None,.. } => {
                // ALL-CONFIRM has no successor phase; ReadyToFinalize handles it instead.
            }
            ConsensusEvent::ReadyToFinalize { round, message_hash } => {
                self.finalize_round(round, message_hash, &ballot).await?;
            }
            ConsensusEvent::Aborted { round, message_hash, vote } => {
                info!(round = %round, vote = %vote, "round aborted, returning transactions to pool");
                self.metrics.consensus.record_round_aborted();
                if let Some(hashes) = self.state_manager.round_proposed_transactions(&round, &message_hash) {
                    self.pool.unmark_proposed(&hashes);
                }
                self.state_manager.close_round(&round);
                self.start_round(round.retry()).await?;
            }
        }
        Ok(())
    }

    /// Independently re-checks the round's proposed transactions against this node's
    /// own account state before committing to SIGN. A validator that disagrees here
    /// votes NO regardless of what the rest of the set already classified the phase as.
    fn revalidate_for_sign(&self, round: &Round) -> VotingHole {
        let Some((_, proposed, _)) = self.state_manager.round_message_content(round) else {
            return VotingHole::No;
        };
        for hash in &proposed {
            let tx = match self.pool.get(hash) {
                Some(tx) => tx,
                None => match self.storage.get_pending_transaction(hash) {
                    Ok(Some(tx)) => tx,
                    _ => return VotingHole::No,
                },
            };
            if tx.verify(&self.network_id).is_err() {
                return VotingHole::No;
            }
            let account = match self.storage.get_account(&tx.source()) {
                Ok(Some(account)) => account,
                _ => return VotingHole::No,
            };
            let Some(required) = tx.fee().checked_add(tx.total_amount()) else {
                return VotingHole::No;
            };
            if account.balance < required {
                return VotingHole::No;
            }
        }
        VotingHole::Yes
    }

    async fn finalize_round(&mut self, round: Round, message_hash: crate::types::Hash, ballot: &Ballot) -> NodeResult<()> {
        let Some(proposer_tx) = ballot.proposer_transaction.clone() else {
            return Err(crate::error::NodeError::InvalidOperation(
                    "cannot finalize a round whose ballot carries no proposer transaction".to_string(),
            ));
        };
        let proposed_hashes = self
            .state_manager
            .round_proposed_transactions(&round, &message_hash)
            .unwrap_or_default();
        let mut proposed_txs = Vec::with_capacity(proposed_hashes.len());
        for hash in &proposed_hashes {
            let tx = match self.pool.get(hash) {
                Some(tx) => tx,
                None => self
                    .storage
                    .get_pending_transaction(hash)?
                    .ok_or_else(|| crate::error::NodeError::TransactionNotFound(hash.to_string()))?,
            };
            proposed_txs.push(tx);
        }

        let block = match self.finalizer.finalize(
            self.storage.as_ref(),
            round,
            ballot.proposer_address,
            proposed_txs,
            proposer_tx,
        ) {
            Ok(block) => block,
            Err(crate::error::NodeError::StaleRound { local, ballot: stale }) => {
                info!(local, stale, "round already superseded by a committed block, dropping");
                self.state_manager.close_round(&round);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        self.pool.remove_committed(&proposed_hashes);
        self.metrics.consensus.record_round_committed();
        self.metrics
            .consensus
            .record_transactions_finalized(block.total_txs);
        self.state_manager.close_round(&round);
        self.state_manager.advance_height(block.height + 1);
        info!(height = block.height, txs = block.total_txs, "committed block");
        self.start_round(round.next(block.hash)).await?;
        Ok(())
    }

    /// React to a phase timing out without reaching its vote threshold. Each phase
    /// advances the local round unilaterally, independent of the quorum tally: INIT
    /// and SIGN move the phase forward and broadcast an EXPIRED vote tagged with the
    /// new phase; ACCEPT is the round's own retry point, rotating the proposer and
    /// resetting to INIT. `transit_state`'s idempotent guard means that if the quorum
    /// tally already advanced the phase first, the matching timeout here is a no-op.
    pub async fn handle_timeout(&mut self, timeout: PhaseTimeout) -> NodeResult<()> {
        if self.state_manager.current_phase(&timeout.round) != Some(timeout.phase) {
            return Ok(());
        }
        self.metrics.consensus.record_phase_timeout(timeout.phase);

        if timeout.phase == VotingPhase::Accept {
            if let Some((_, proposed, _)) = self.state_manager.round_message_content(&timeout.round) {
                self.pool.unmark_proposed(&proposed);
            }
            self.state_manager.close_round(&timeout.round);
            self.start_round(timeout.round.retry()).await?;
            return Ok(());
        }

        let Some(next_phase) = timeout.phase.next() else {
            return Ok(());
        };
        if !self.state_manager.transit_state(timeout.round, next_phase) {
            return Ok(());
        }
        self.state_manager
            .arm_phase_timer(timeout.round, next_phase, self.timeout_tx.clone());

        let (proposed, proposer_transaction) = match self.state_manager.round_message_content(&timeout.round) {
            Some((_, proposed, proposer_transaction)) => (proposed, proposer_transaction),
            None => (Vec::new(), None),
        };
        let proposer = self.state_manager.proposer_for(&timeout.round);
        let ballot = Ballot::new_vote(
            &self.keypair,
            &self.network_id,
            proposer,
            timeout.round,
            next_phase,
            VotingHole::Expired,
            proposed,
            proposer_transaction,
            crate::types::Timestamp::now(),
        );
        self.broadcast_ballot(&ballot).await?;
        self.handle_ballot(ballot).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::state_manager::{
        RoundRobin, SelfProposerCalculator, SelfThenOtherProposerCalculator, TheOtherProposerCalculator,
    };
    use crate::storage::{Batch, MemoryStore};
    use crate::testing::TestHarness;
    use crate::types::{Amount, Operation};

    fn runner_for(
        harness: &TestHarness,
        index: usize,
        proposer_selector: Box<dyn ProposerSelector>,
    ) -> (NodeRunner, mpsc::Receiver<PhaseTimeout>) {
        let config = harness.config_for(index);
        let storage: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (timeout_tx, timeout_rx) = mpsc::channel(16);
        let runner = NodeRunner::new(
            config,
            harness.keypairs[index].clone(),
            storage,
            proposer_selector,
            timeout_tx,
        )
        .unwrap();
        (runner, timeout_rx)
    }

    fn only_ballot(rx: &mut broadcast::Receiver<Envelope>) -> Ballot {
        let envelope = rx.try_recv().expect("expected exactly one broadcast");
        let ballot = envelope.decode_ballot().unwrap();
        assert!(rx.try_recv().is_err(), "expected no further broadcasts");
        ballot
    }

    /// Concrete scenario 1: a self-proposing node opens a round and broadcasts exactly
    /// one INIT/YES ballot; with hour-long timeouts nothing else fires.
    #[tokio::test]
    async fn self_proposer_broadcasts_init_yes_once() {
        let harness = TestHarness::new(3);
        let self_address = harness.keypairs[0].address();
        let (mut runner, _timeout_rx) =
            runner_for(&harness, 0, Box::new(SelfProposerCalculator { self_address }));
        let mut events = runner.events().subscribe();

        runner.start_round(Round::genesis()).await.unwrap();

        let ballot = only_ballot(&mut events);
        assert_eq!(ballot.phase, VotingPhase::Init);
        assert_eq!(ballot.vote, VotingHole::Yes);
        assert_eq!(ballot.proposer_address, self_address);
    }

    /// Concrete scenario 2: a non-proposer's INIT timer expires before it ever sees a
    /// proposal; it walks itself to SIGN and broadcasts a single EXPIRED vote there.
    #[tokio::test]
    async fn non_proposer_init_timeout_expires_to_sign() {
        let harness = TestHarness::new(3);
        let self_address = harness.keypairs[1].address();
        let mut config = harness.config_for(1);
        config.consensus.timeout_init_ms = 1;
        let storage: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (timeout_tx, mut timeout_rx) = mpsc::channel(16);
        let mut runner = NodeRunner::new(
            config,
            harness.keypairs[1].clone(),
            storage,
            Box::new(TheOtherProposerCalculator { self_address }),
            timeout_tx,
        )
        .unwrap();
        let mut events = runner.events().subscribe();

        runner.start_round(Round::genesis()).await.unwrap();
        assert!(events.try_recv().is_err(), "non-proposer does not broadcast at round open");

        let fired = tokio::time::timeout(std::time::Duration::from_secs(1), timeout_rx.recv())
            .await
            .expect("timer did not fire")
            .unwrap();
        runner.handle_timeout(fired).await.unwrap();

        let ballot = only_ballot(&mut events);
        assert_eq!(ballot.phase, VotingPhase::Sign);
        assert_eq!(ballot.vote, VotingHole::Expired);
        assert_eq!(runner.phase_of(&Round::genesis()), Some(VotingPhase::Sign));
    }

    /// Concrete scenario 3: the proposer's own SIGN timer expires (its own vote never
    /// closes the phase alone); it walks itself to ACCEPT with an EXPIRED vote.
    #[tokio::test]
    async fn proposer_sign_timeout_expires_to_accept() {
        let harness = TestHarness::new(3);
        let self_address = harness.keypairs[0].address();
        let mut config = harness.config_for(0);
        config.consensus.timeout_sign_ms = 1;
        let storage: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (timeout_tx, mut timeout_rx) = mpsc::channel(16);
        let mut runner = NodeRunner::new(
            config,
            harness.keypairs[0].clone(),
            storage,
            Box::new(SelfProposerCalculator { self_address }),
            timeout_tx,
        )
        .unwrap();
        let mut events = runner.events().subscribe();

        runner.start_round(Round::genesis()).await.unwrap();
        let init_ballot = only_ballot(&mut events);
        assert_eq!(init_ballot.phase, VotingPhase::Init);
        assert_eq!(init_ballot.vote, VotingHole::Yes);

        let fired = tokio::time::timeout(std::time::Duration::from_secs(1), timeout_rx.recv())
            .await
            .expect("sign timer did not fire")
            .unwrap();
        assert_eq!(fired.phase, VotingPhase::Sign);
        runner.handle_timeout(fired).await.unwrap();

        let accept_ballot = only_ballot(&mut events);
        assert_eq!(accept_ballot.phase, VotingPhase::Accept);
        assert_eq!(accept_ballot.vote, VotingHole::Expired);
        assert_eq!(runner.phase_of(&Round::genesis()), Some(VotingPhase::Accept));
    }

    /// Concrete scenario 4: a node that alternates proposer/non-proposer by round
    /// number proposes round 0, times out through SIGN and ACCEPT, retries into round
    /// 1 where it is no longer proposer and stays quiet.
    #[tokio::test]
    async fn alternating_proposer_goes_quiet_once_retried_round_is_not_its_turn() {
        let harness = TestHarness::new(3);
        let self_address = harness.keypairs[0].address();
        let mut config = harness.config_for(0);
        config.consensus.timeout_sign_ms = 1;
        config.consensus.timeout_accept_ms = 1;
        let storage: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (timeout_tx, mut timeout_rx) = mpsc::channel(16);
        let mut runner = NodeRunner::new(
            config,
            harness.keypairs[0].clone(),
            storage,
            Box::new(SelfThenOtherProposerCalculator { self_address }),
            timeout_tx,
        )
        .unwrap();
        let mut events = runner.events().subscribe();

        runner.start_round(Round::genesis()).await.unwrap();
        let init_ballot = only_ballot(&mut events);
        assert_eq!(init_ballot.phase, VotingPhase::Init);

        let sign_timeout = tokio::time::timeout(std::time::Duration::from_secs(1), timeout_rx.recv())
            .await
            .expect("sign timer did not fire")
            .unwrap();
        runner.handle_timeout(sign_timeout).await.unwrap();
        let accept_ballot = only_ballot(&mut events);
        assert_eq!(accept_ballot.phase, VotingPhase::Accept);
        assert_eq!(accept_ballot.vote, VotingHole::Expired);

        // ACCEPT's own timeout retries the round instead of walking to ALL-CONFIRM; the
        // retried round (number 1, odd) is the other validator's turn to propose.
        let accept_timeout = tokio::time::timeout(std::time::Duration::from_secs(1), timeout_rx.recv())
            .await
            .expect("accept timer did not fire")
            .unwrap();
        runner.handle_timeout(accept_timeout).await.unwrap();

        assert!(events.try_recv().is_err(), "not this node's turn to propose the retried round");
        assert_eq!(runner.phase_of(&Round::genesis().retry()), Some(VotingPhase::Init));
    }

    fn seed_account(storage: &Arc<dyn Store>, address: Address, balance: Amount) {
        let mut batch = storage.new_batch();
        batch.put_account(&crate::types::BlockAccount::new(address, balance, None)).unwrap();
        storage.commit(batch).unwrap();
    }

    /// Concrete scenario 5: a payment submitted to one validator reaches ALL-CONFIRM
    /// across all three nodes once ballots are relayed between them, and the block
    /// commits identically on every node's own storage.
    #[tokio::test]
    async fn three_node_payment_reaches_all_confirm_and_commits() {
        let harness = TestHarness::new(3);
        let addresses = harness.addresses();
        let stores: Vec<Arc<dyn Store>> = (0..3).map(|_| Arc::new(MemoryStore::new()) as Arc<dyn Store>).collect();

        // Every node's storage needs every validator's account to exist: the proposer's
        // own (fee-only) transaction and the payment source both debit an account that
        // must already be on record, on every node that finalizes the block.
        let source_balance = Amount::from_gon(1_000_000);
        for store in &stores {
            for addr in &addresses {
                seed_account(store, *addr, Amount::zero());
            }
            seed_account(store, addresses[0], source_balance);
        }

        let (timeout_tx, _rx0) = mpsc::channel(16);
        let mut node0 = NodeRunner::new(
            harness.config_for(0),
            harness.keypairs[0].clone(),
            stores[0].clone(),
            Box::new(RoundRobin),
            timeout_tx,
        )
        .unwrap();
        let (timeout_tx, _rx1) = mpsc::channel(16);
        let mut node1 = NodeRunner::new(
            harness.config_for(1),
            harness.keypairs[1].clone(),
            stores[1].clone(),
            Box::new(RoundRobin),
            timeout_tx,
        )
        .unwrap();
        let (timeout_tx, _rx2) = mpsc::channel(16);
        let mut node2 = NodeRunner::new(
            harness.config_for(2),
            harness.keypairs[2].clone(),
            stores[2].clone(),
            Box::new(RoundRobin),
            timeout_tx,
        )
        .unwrap();

        let payment = Transaction::new_signed(
            &harness.keypairs[0],
            harness.network_id.as_bytes(),
            Amount::from_gon(10_000),
            1,
            vec![Operation::payment(addresses[1], Amount::from_gon(5_000))],
        );

        let mut events0 = node0.events().subscribe();
        let mut events1 = node1.events().subscribe();
        let mut events2 = node2.events().subscribe();

        // RoundRobin picks the genesis round's proposer from the sorted validator set,
        // not necessarily node0, so every node needs the transaction admitted into its
        // own pool before the rounds open.
        node0.handle_transaction(payment.clone()).await.unwrap();
        node1.handle_transaction(payment.clone()).await.unwrap();
        node2.handle_transaction(payment.clone()).await.unwrap();

        node0.start_round(Round::genesis()).await.unwrap();
        node1.start_round(Round::genesis()).await.unwrap();
        node2.start_round(Round::genesis()).await.unwrap();

        // Relay every broadcast envelope to the two nodes that did not emit it, until
        // no node has anything new to say. Bounded so a consensus bug shows up as a
        // test failure instead of a hang.
        let mut queue: VecDeque<(usize, Envelope)> = VecDeque::new();
        for (i, rx) in [&mut events0, &mut events1, &mut events2].into_iter().enumerate() {
            while let Ok(envelope) = rx.try_recv() {
                queue.push_back((i, envelope));
            }
        }

        let mut guard = 0;
        while let Some((origin, envelope)) = queue.pop_front() {
            guard += 1;
            assert!(guard < 500, "ballot relay did not converge");
            let ballot = envelope.decode_ballot().unwrap();
            let runners: [(&mut NodeRunner, &mut broadcast::Receiver<Envelope>); 3] =
                [(&mut node0, &mut events0), (&mut node1, &mut events1), (&mut node2, &mut events2)];
            for (i, (runner, rx)) in runners.into_iter().enumerate() {
                if i == origin {
                    continue;
                }
                runner.handle_ballot(ballot.clone()).await.unwrap();
                while let Ok(envelope) = rx.try_recv() {
                    queue.push_back((i, envelope));
                }
            }
        }

        for store in &stores {
            assert_eq!(store.latest_height().unwrap(), 2);
            let source = store.get_account(&addresses[0]).unwrap().unwrap();
            assert_eq!(source.balance, source_balance.checked_sub(Amount::from_gon(15_000)).unwrap());
        }
    }

    /// Concrete scenario 6: with two of three validators voting NO at INIT, the tally
    /// closes NO-wins, no block is produced, and the proposer's pool keeps the
    /// transaction available for a future round instead of discarding it.
    #[tokio::test]
    async fn two_of_three_no_votes_abort_init_without_producing_a_block() {
        let harness = TestHarness::new(3);
        let self_address = harness.keypairs[0].address();
        let (mut runner, _timeout_rx) =
            runner_for(&harness, 0, Box::new(SelfProposerCalculator { self_address }));
        seed_account(&runner.storage, self_address, Amount::from_gon(1_000_000));

        let payment = Transaction::new_signed(
            &harness.keypairs[0],
            harness.network_id.as_bytes(),
            Amount::from_gon(10_000),
            1,
            vec![Operation::payment(harness.keypairs[1].address(), Amount::from_gon(5_000))],
        );
        runner.handle_transaction(payment.clone()).await.unwrap();

        let mut events = runner.events().subscribe();
        runner.start_round(Round::genesis()).await.unwrap();
        let proposal = only_ballot(&mut events);
        assert_eq!(proposal.proposed_transactions, vec![payment.hash()]);

        let no_from_1 = proposal.derive(&harness.keypairs[1], harness.network_id.as_bytes(), VotingPhase::Init, VotingHole::No);
        runner.handle_ballot(no_from_1).await.unwrap();
        assert_eq!(runner.storage.latest_height().unwrap(), 0);

        let no_from_2 = proposal.derive(&harness.keypairs[2], harness.network_id.as_bytes(), VotingPhase::Init, VotingHole::No);
        runner.handle_ballot(no_from_2).await.unwrap();

        assert_eq!(runner.storage.latest_height().unwrap(), 0, "NO-wins must not finalize a block");
        assert!(runner.pool.contains(&payment.hash()), "rejected transaction stays in the pool for a future round");
        // The round aborted and automatically retried; since this node is always its
        // own proposer it re-proposes immediately and walks itself on to SIGN, same as
        // the original round did.
        assert_eq!(runner.phase_of(&Round::genesis().retry()), Some(VotingPhase::Sign));
    }
}
