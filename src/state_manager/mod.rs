pub mod proposer;
pub mod timer;

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::config::NodeConfig;
use crate::consensus::{Consensus, ConsensusEvent};
use crate::crypto::Address;
use crate::error::NodeResult;
use crate::types::{Ballot, Hash, Round, Transaction, VotingPhase};

pub use proposer::{
    ProposerSelector, RoundRobin, SelfProposerCalculator, SelfThenOtherProposerCalculator,
    TheOtherProposerCalculator,
};
pub use timer::{PhaseTimeout, PhaseTimeouts, RoundTimer};

/// Drives the ballot state machine for every in-flight round: tracks which phase each
/// round is in, arms/cancels per-phase timeouts, and resolves who proposes a round.
pub struct ISAACStateManager {
    validators: Vec<Address>,
    consensus: Consensus,
    proposer_selector: Box<dyn ProposerSelector>,
    timeouts: PhaseTimeouts,
    timers: HashMap<Round, RoundTimer>,
    current_phase: HashMap<Round, VotingPhase>,
}

impl ISAACStateManager {
    /// `validators` here is the full voting set, `self_address` included: proposer
    /// selection and vote-threshold percentages are both computed over this set, not
    /// just the peers a node dials out to.
    pub fn new(config: &NodeConfig, self_address: Address, proposer_selector: Box<dyn ProposerSelector>) -> Self {
        let mut validators: Vec<Address> = config
            .validators
            .iter()
            .filter_map(|p| Address::parse(&p.address).ok())
            .collect();
        if !validators.contains(&self_address) {
            validators.push(self_address);
        }
        Self {
            validators,
            consensus: Consensus::new(&config.consensus),
            proposer_selector,
            timeouts: PhaseTimeouts::from_config(&config.consensus),
            timers: HashMap::new(),
            current_phase: HashMap::new(),
        }
    }

    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    pub fn proposer_for(&self, round: &Round) -> Address {
        self.proposer_selector.select(round, &self.validators)
    }

    pub fn is_self_proposer(&self, round: &Round, self_address: &Address) -> bool {
        self.proposer_for(round) == *self_address
    }

    /// Record that `round` has entered `phase`. Returns `false` (and changes nothing)
    /// if the round was already at this phase or past it, making repeated calls safe.
    pub fn transit_state(&mut self, round: Round, phase: VotingPhase) -> bool {
        match self.current_phase.get(&round) {
            Some(existing) if *existing >= phase => false,
            _ => {
                self.current_phase.insert(round, phase);
                true
            }
        }
    }

    pub fn current_phase(&self, round: &Round) -> Option<VotingPhase> {
        self.current_phase.get(round).copied()
    }

    pub fn arm_phase_timer(&mut self, round: Round, phase: VotingPhase, tx: mpsc::Sender<PhaseTimeout>) {
        let duration = self.timeouts.for_phase(phase);
        self.timers
            .entry(round)
            .or_insert_with(RoundTimer::new)
            .arm(duration, round, phase, tx);
    }

    pub fn cancel_timer(&mut self, round: &Round) {
        if let Some(timer) = self.timers.get_mut(round) {
            timer.cancel();
        }
    }

    pub fn receive_ballot(&mut self, ballot: &Ballot) -> NodeResult<ConsensusEvent> {
        self.consensus.receive_ballot(ballot, self.validators.len())
    }

    /// `isNew = ¬RunningRounds.has(messageHash)`: whether a tally is already running
    /// for this exact `(round, messageHash)` pair.
    pub fn is_new_message(&self, round: &Round, message_hash: &Hash) -> bool {
        !self.consensus.has_running(round, message_hash)
    }

    /// The canonical proposed content already admitted for `round`, if any: used to
    /// build a timeout's synthetic ballot so it reuses the exact content the round is
    /// contesting instead of hashing to a new, unrelated message.
    pub fn round_message_content(&self, round: &Round) -> Option<(Hash, Vec<Hash>, Option<Transaction>)> {
        self.consensus.round_message_content(round)
    }

    pub fn close_round(&mut self, round: &Round) {
        self.consensus.close_round(round);
        self.timers.remove(round);
        self.current_phase.remove(round);
    }

    pub fn advance_height(&mut self, height: u64) {
        self.consensus.advance_height(height);
        self.timers.retain(|r, _| r.height >= height);
        self.current_phase.retain(|r, _| r.height >= height);
    }

    pub fn round_proposed_transactions(&self, round: &Round, message_hash: &Hash) -> Option<Vec<Hash>> {
        self.consensus.round_proposed_transactions(round, message_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::types::Hash;

    #[test]
    fn transit_state_rejects_going_backwards() {
        let config = NodeConfig::default_for_testing();
        let self_address = crate::crypto::KeyPair::generate(&mut rand_core::OsRng).address();
        let mut manager = ISAACStateManager::new(&config, self_address, Box::new(RoundRobin));
        let round = Round::new(1, 0, Hash::zero());
        assert!(manager.transit_state(round, VotingPhase::Sign));
        assert!(!manager.transit_state(round, VotingPhase::Init));
        assert!(manager.transit_state(round, VotingPhase::Accept));
    }
}
