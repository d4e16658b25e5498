use std::collections::{HashMap, HashSet};

use crate::config::ConsensusConfig;
use crate::error::NodeResult;
use crate::types::{Ballot, Hash, Round, Transaction, VotingHole, VotingPhase};

use super::tally::RunningRounds;
use super::threshold::VotingThresholdPolicy;

/// What happened to the round as a result of receiving one ballot.
#[derive(Clone, Debug)]
pub enum ConsensusEvent {
    /// The vote was counted but did not move the round past any threshold.
    Recorded,
    /// This phase just crossed its threshold for the first time. `vote` is what the
    /// local node should now sign and broadcast for `next_phase`; `next_phase` is `None` when `vote` is anything but `Yes`, since
    /// a `No` or `Expired` verdict ends the round instead of advancing it.
    PhaseClosed {
        round: Round,
        message_hash: Hash,
        closed_phase: VotingPhase,
        vote: VotingHole,
        next_phase: Option<VotingPhase>,
    },
    /// ALL-CONFIRM closed with `Yes`: the round is ready to finalize into a block.
    ReadyToFinalize { round: Round, message_hash: Hash },
    /// The round closed with `No` or `Expired` before ALL-CONFIRM: it will not
    /// produce a block and its proposed transactions return to the pool.
    Aborted {
        round: Round,
        message_hash: Hash,
        vote: VotingHole,
    },
}

/// The ISAAC ballot-voting engine: tallies votes per `(round, messageHash)` and
/// classifies each phase against the configured threshold.
pub struct Consensus {
    policy: VotingThresholdPolicy,
    rounds: RunningRounds,
    closed_phases: HashMap<(Round, Hash), HashSet<VotingPhase>>,
    /// The first message hash admitted for each round, so a later phase timeout can
    /// reuse the exact proposed content that the round is actually contesting.
    canonical: HashMap<Round, Hash>,
}

impl Consensus {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            policy: VotingThresholdPolicy::from_config(config),
            rounds: RunningRounds::new(),
            closed_phases: HashMap::new(),
            canonical: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &VotingThresholdPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut VotingThresholdPolicy {
        &mut self.policy
    }

    /// Whether a tally is already running for this exact `(round, messageHash)` pair.
    /// Backs the ballot checker's `isNew` step: `isNew = ¬RunningRounds.has(messageHash)`.
    pub fn has_running(&self, round: &Round, message_hash: &Hash) -> bool {
        self.rounds.has(round, message_hash)
    }

    /// The canonical proposed content for `round`, if any proposal has been admitted
    /// for it yet: `(messageHash, proposed_transactions, proposer_transaction)`.
    pub fn round_message_content(
        &self,
        round: &Round,
    ) -> Option<(Hash, Vec<Hash>, Option<Transaction>)> {
        let hash = *self.canonical.get(round)?;
        let result = self.rounds.get(round, &hash)?;
        Some((
                hash,
                result.proposed_transactions.clone(),
                result.proposer_transaction.clone(),
        ))
    }

    /// Fold one incoming ballot into the round's tally and classify the affected phase.
    /// This assumes `ballot` already passed the ballot checker chain.
    pub fn receive_ballot(&mut self, ballot: &Ballot, total_validators: usize) -> NodeResult<ConsensusEvent> {
        let round = ballot.round;
        let phase = ballot.phase;
        let message_hash = ballot.message_hash();

        self.canonical.entry(round).or_insert(message_hash);

        let result = self.rounds.get_or_create(
            round,
            message_hash,
            || ballot.proposed_transactions.clone(),
            || ballot.proposer_transaction.clone(),
        );
        result.add_vote(phase, ballot.sender_address, ballot.vote);

        let key = (round, message_hash);
        let already_closed = self
            .closed_phases
            .get(&key)
            .map(|set| set.contains(&phase))
            .unwrap_or(false);
        if already_closed {
            return Ok(ConsensusEvent::Recorded);
        }

        let tally = result.tally(phase);
        let Some(vote) = self.policy.classify(phase, &tally, total_validators) else {
            return Ok(ConsensusEvent::Recorded);
        };

        self.closed_phases.entry(key).or_default().insert(phase);

        if vote != VotingHole::Yes {
            self.rounds.remove(&round, &message_hash);
            self.closed_phases.remove(&key);
            self.canonical.remove(&round);
            return Ok(ConsensusEvent::Aborted {
                round,
                message_hash,
                vote,
            });
        }

        match phase.next() {
            Some(next_phase) => Ok(ConsensusEvent::PhaseClosed {
                    round,
                    message_hash,
                    closed_phase: phase,
                    vote,
                    next_phase: Some(next_phase),
            }),
            None => Ok(ConsensusEvent::ReadyToFinalize { round, message_hash }),
        }
    }

    /// Called once a round has been finalized or abandoned, so its ballots stop
    /// occupying memory and a stale ballot for it cannot reopen the round.
    pub fn close_round(&mut self, round: &Round) {
        self.rounds.remove_round(round);
        self.closed_phases.retain(|(r, _), _| r != round);
        self.canonical.remove(round);
    }

    /// Drop every in-flight round below `height` once a block commits there.
    pub fn advance_height(&mut self, height: u64) {
        self.rounds.clear_below_height(height);
        self.closed_phases.retain(|(round, _), _| round.height >= height);
        self.canonical.retain(|round, _| round.height >= height);
    }

    pub fn round_proposed_transactions(&self, round: &Round, message_hash: &Hash) -> Option<Vec<Hash>> {
        self.rounds
            .get(round, message_hash)
            .map(|r| r.proposed_transactions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsensusConfig;
    use crate::crypto::KeyPair;
    use crate::types::{Amount, Hash, Transaction};

    fn config() -> ConsensusConfig {
        ConsensusConfig {
            threshold_init_percent: 66,
            threshold_sign_percent: 66,
            threshold_accept_percent: 66,
            threshold_allconfirm_percent: 100,
            ..Default::default()
        }
    }

    fn ballot_for(round: Round, phase: VotingPhase, voter: &KeyPair, proposer: &KeyPair) -> Ballot {
        let ptx = Transaction::new_signed(proposer, b"net", Amount::zero(), 0, vec![]);
        let proposal = Ballot::new_proposal(proposer, b"net", round, vec![Hash::from_bytes(b"t1")], ptx);
        proposal.derive(voter, b"net", phase, VotingHole::Yes)
    }

    #[test]
    fn three_of_three_yes_closes_init_and_advances() {
        let mut engine = Consensus::new(&config());
        let proposer = KeyPair::generate(&mut rand_core::OsRng);
        let voters: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate(&mut rand_core::OsRng)).collect();
        let round = Round::genesis();

        let mut last = ConsensusEvent::Recorded;
        for v in &voters {
            let ballot = ballot_for(round, VotingPhase::Init, v, &proposer);
            last = engine.receive_ballot(&ballot, 3).unwrap();
        }
        match last {
            ConsensusEvent::PhaseClosed { next_phase, vote,.. } => {
                assert_eq!(vote, VotingHole::Yes);
                assert_eq!(next_phase, Some(VotingPhase::Sign));
            }
            other => panic!("expected PhaseClosed, got {:?}", other),
        }
    }

    #[test]
    fn phase_close_only_fires_once() {
        let mut engine = Consensus::new(&config());
        let proposer = KeyPair::generate(&mut rand_core::OsRng);
        let voters: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate(&mut rand_core::OsRng)).collect();
        let round = Round::genesis();

        for v in &voters {
            let ballot = ballot_for(round, VotingPhase::Init, v, &proposer);
            engine.receive_ballot(&ballot, 3).unwrap();
        }
        let extra_voter = KeyPair::generate(&mut rand_core::OsRng);
        let ballot = ballot_for(round, VotingPhase::Init, &extra_voter, &proposer);
        let event = engine.receive_ballot(&ballot, 3).unwrap();
        assert!(matches!(event, ConsensusEvent::Recorded));
    }

    #[test]
    fn all_confirm_closing_yields_ready_to_finalize() {
        let mut engine = Consensus::new(&config());
        let proposer = KeyPair::generate(&mut rand_core::OsRng);
        let voters: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate(&mut rand_core::OsRng)).collect();
        let round = Round::genesis();

        let mut last = ConsensusEvent::Recorded;
        for v in &voters {
            let ballot = ballot_for(round, VotingPhase::AllConfirm, v, &proposer);
            last = engine.receive_ballot(&ballot, 3).unwrap();
        }
        assert!(matches!(last, ConsensusEvent::ReadyToFinalize {.. }));
    }

    #[test]
    fn votes_for_different_proposed_content_do_not_combine() {
        let mut engine = Consensus::new(&config());
        let proposer = KeyPair::generate(&mut rand_core::OsRng);
        let round = Round::genesis();

        let ptx_a = Transaction::new_signed(&proposer, b"net", Amount::zero(), 0, vec![]);
        let ballot_a =
        Ballot::new_proposal(&proposer, b"net", round, vec![Hash::from_bytes(b"a")], ptx_a);

        let ptx_b = Transaction::new_signed(&proposer, b"net", Amount::zero(), 0, vec![]);
        let ballot_b =
        Ballot::new_proposal(&proposer, b"net", round, vec![Hash::from_bytes(b"b")], ptx_b);

        let hash_a = ballot_a.message_hash();
        let hash_b = ballot_b.message_hash();
        assert_ne!(hash_a, hash_b);

        engine.receive_ballot(&ballot_a, 3).unwrap();
        engine.receive_ballot(&ballot_b, 3).unwrap();

        assert!(engine.has_running(&round, &hash_a));
        assert!(engine.has_running(&round, &hash_b));
        assert_eq!(
            engine.round_proposed_transactions(&round, &hash_a),
            Some(vec![Hash::from_bytes(b"a")])
        );
        assert_eq!(
            engine.round_proposed_transactions(&round, &hash_b),
            Some(vec![Hash::from_bytes(b"b")])
        );
    }
}
