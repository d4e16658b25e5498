use std::collections::{HashMap, HashSet};

use crate::crypto::Address;
use crate::types::{Hash, Round, Transaction, VotingHole, VotingPhase};

use super::threshold::VoteTally;

/// The votes collected so far for a single `(round, messageHash)` pair, across all
/// four phases. One of these is kept per in-flight proposal in `RunningRounds`; two
/// ballots for the same round but different proposed content never share one, so
/// their votes can never combine to cross a threshold neither actually received.
pub struct VotingResult {
    pub round: Round,
    pub message_hash: Hash,
    pub proposed_transactions: Vec<Hash>,
    pub proposer_transaction: Option<Transaction>,
    tallies: HashMap<VotingPhase, VoteTally>,
    voters: HashMap<VotingPhase, HashSet<Address>>,
}

impl VotingResult {
    pub fn new(
        round: Round,
        message_hash: Hash,
        proposed_transactions: Vec<Hash>,
        proposer_transaction: Option<Transaction>,
    ) -> Self {
        Self {
            round,
            message_hash,
            proposed_transactions,
            proposer_transaction,
            tallies: HashMap::new(),
            voters: HashMap::new(),
        }
    }

    /// Record `sender`'s vote for `phase`. Returns `false` without changing the tally
    /// if this sender already voted in this phase (ballots are idempotent per voter).
    pub fn add_vote(&mut self, phase: VotingPhase, sender: Address, vote: VotingHole) -> bool {
        let voters = self.voters.entry(phase).or_default();
        if !voters.insert(sender) {
            return false;
        }
        self.tallies.entry(phase).or_default().record(vote);
        true
    }

    pub fn tally(&self, phase: VotingPhase) -> VoteTally {
        self.tallies.get(&phase).copied().unwrap_or_default()
    }

    pub fn voter_count(&self, phase: VotingPhase) -> usize {
        self.voters.get(&phase).map(|s| s.len()).unwrap_or(0)
    }

    pub fn has_voted(&self, phase: VotingPhase, sender: &Address) -> bool {
        self.voters
            .get(&phase)
            .map(|s| s.contains(sender))
            .unwrap_or(false)
    }
}

/// All proposals with votes currently in flight, keyed by `(round, messageHash)`. A
/// proposal is removed once its ballot closes (commits or is abandoned) so memory
/// stays bounded by the number of proposals actually being contested at once.
#[derive(Default)]
pub struct RunningRounds {
    results: HashMap<(Round, Hash), VotingResult>,
}

impl RunningRounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &mut self,
        round: Round,
        message_hash: Hash,
        proposed_transactions: impl FnOnce() -> Vec<Hash>,
        proposer_transaction: impl FnOnce() -> Option<Transaction>,
    ) -> &mut VotingResult {
        self.results.entry((round, message_hash)).or_insert_with(|| {
            VotingResult::new(round, message_hash, proposed_transactions(), proposer_transaction())
        })
    }

    /// Whether any proposal is already running for this exact `(round, messageHash)`
    /// pair. Backs the ballot checker's `isNew` step.
    pub fn has(&self, round: &Round, message_hash: &Hash) -> bool {
        self.results.contains_key(&(*round, *message_hash))
    }

    pub fn get(&self, round: &Round, message_hash: &Hash) -> Option<&VotingResult> {
        self.results.get(&(*round, *message_hash))
    }

    pub fn get_mut(&mut self, round: &Round, message_hash: &Hash) -> Option<&mut VotingResult> {
        self.results.get_mut(&(*round, *message_hash))
    }

    pub fn remove(&mut self, round: &Round, message_hash: &Hash) -> Option<VotingResult> {
        self.results.remove(&(*round, *message_hash))
    }

    /// Remove every proposal running for `round`, regardless of message hash.
    pub fn remove_round(&mut self, round: &Round) {
        self.results.retain(|(r, _), _| r != round);
    }

    /// Drop every in-flight round below `height`: once a block commits at `height`,
    /// older attempts can no longer close.
    pub fn clear_below_height(&mut self, height: u64) {
        self.results.retain(|(round, _), _| round.height >= height);
    }
}

/// Tracks a round's current phase and the most recently classified vote, so the
/// state manager can tell whether a phase just closed without re-deriving it from
/// the raw tally every time.
#[derive(Clone, Copy, Debug)]
pub struct VotingStateStaging {
    pub round: Round,
    pub phase: VotingPhase,
    pub latest_vote: Option<VotingHole>,
}

impl VotingStateStaging {
    pub fn new(round: Round, phase: VotingPhase) -> Self {
        Self {
            round,
            phase,
            latest_vote: None,
        }
    }

    pub fn record_classification(&mut self, vote: VotingHole) {
        self.latest_vote = Some(vote);
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.latest_vote, Some(VotingHole::Yes) | Some(VotingHole::No) | Some(VotingHole::Expired))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Address {
        let mut rng = rand_core::OsRng;
        crate::crypto::KeyPair::generate(&mut rng).address()
    }

    #[test]
    fn duplicate_voter_does_not_double_count() {
        let mut result = VotingResult::new(Round::genesis(), Hash::zero(), vec![], None);
        let a = addr();
        assert!(result.add_vote(VotingPhase::Init, a, VotingHole::Yes));
        assert!(!result.add_vote(VotingPhase::Init, a, VotingHole::Yes));
        assert_eq!(result.tally(VotingPhase::Init).yes, 1);
    }

    #[test]
    fn clear_below_height_drops_stale_rounds() {
        let mut rounds = RunningRounds::new();
        let stale = Round::new(1, 0, Hash::zero());
        let current = Round::new(5, 0, Hash::zero());
        let msg = Hash::from_bytes(b"m");
        rounds.get_or_create(stale, msg, Vec::new, || None);
        rounds.get_or_create(current, msg, Vec::new, || None);
        rounds.clear_below_height(5);
        assert!(rounds.get(&stale, &msg).is_none());
        assert!(rounds.get(&current, &msg).is_some());
    }

    #[test]
    fn distinct_message_hashes_do_not_share_a_tally() {
        let mut rounds = RunningRounds::new();
        let round = Round::genesis();
        let a = Hash::from_bytes(b"a");
        let b = Hash::from_bytes(b"b");
        let voter = addr();
        rounds
            .get_or_create(round, a, Vec::new, || None)
            .add_vote(VotingPhase::Init, voter, VotingHole::Yes);
        assert_eq!(rounds.get(&round, &a).unwrap().tally(VotingPhase::Init).yes, 1);
        assert!(rounds.get(&round, &b).is_none());
    }
}
