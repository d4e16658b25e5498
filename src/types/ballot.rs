use serde::{Deserialize, Serialize};

use crate::crypto::{Address, KeyPair, Signature};
use crate::types::transaction::Transaction;
use crate::types::{Hash, Round, Timestamp};

/// The ballot state machine phases: INIT -> SIGN -> ACCEPT -> ALL-CONFIRM.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, PartialOrd, Ord)]
pub enum VotingPhase {
    Init,
    Sign,
    Accept,
    AllConfirm,
}

impl VotingPhase {
    pub fn next(self) -> Option<VotingPhase> {
        match self {
            VotingPhase::Init => Some(VotingPhase::Sign),
            VotingPhase::Sign => Some(VotingPhase::Accept),
            VotingPhase::Accept => Some(VotingPhase::AllConfirm),
            VotingPhase::AllConfirm => None,
        }
    }
}

impl std::fmt::Display for VotingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VotingPhase::Init => "INIT",
            VotingPhase::Sign => "SIGN",
            VotingPhase::Accept => "ACCEPT",
            VotingPhase::AllConfirm => "ALL-CONFIRM",
        };
        write!(f, "{}", s)
    }
}

/// A single validator's vote on a ballot. Tie-break precedence when tallying is
/// `Expired > No > Yes`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug, PartialOrd, Ord)]
pub enum VotingHole {
    Yes,
    No,
    Expired,
    NotYet,
}

impl std::fmt::Display for VotingHole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VotingHole::Yes => "YES",
            VotingHole::No => "NO",
            VotingHole::Expired => "EXPIRED",
            VotingHole::NotYet => "NOT-YET",
        };
        write!(f, "{}", s)
    }
}

/// A single signed vote on a round, broadcast between validators over the course of
/// the ballot state machine.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Ballot {
    pub hash: Hash,
    pub signature: Signature,
    pub proposer_address: Address,
    pub sender_address: Address,
    pub round: Round,
    pub phase: VotingPhase,
    pub vote: VotingHole,
    pub proposed_transactions: Vec<Hash>,
    pub proposer_transaction: Option<Transaction>,
    pub proposer_confirmed_time: Timestamp,
}

impl Ballot {
    /// The bytes the ballot hash and signature cover: everything except the hash and
    /// signature fields themselves.
    fn signing_payload(
        proposer_address: &Address,
        sender_address: &Address,
        round: &Round,
        phase: VotingPhase,
        vote: VotingHole,
        proposed_transactions: &[Hash],
        proposer_transaction: &Option<Transaction>,
        proposer_confirmed_time: Timestamp,
    ) -> Vec<u8> {
        #[derive(Serialize)]
        struct Payload<'a> {
            proposer_address: &'a Address,
            sender_address: &'a Address,
            round: &'a Round,
            phase: VotingPhase,
            vote: VotingHole,
            proposed_transactions: &'a [Hash],
            proposer_transaction_hash: Option<Hash>,
            proposer_confirmed_time: Timestamp,
        }
        let payload = Payload {
            proposer_address,
            sender_address,
            round,
            phase,
            vote,
            proposed_transactions,
            proposer_transaction_hash: proposer_transaction.as_ref().map(|t| t.hash()),
            proposer_confirmed_time,
        };
        bincode::serialize(&payload).expect("ballot payload always serializes")
    }

    /// Build and sign a fresh INIT-phase ballot, as the proposer does when opening a round.
    pub fn new_proposal(
        keypair: &KeyPair,
        network_id: &[u8],
        round: Round,
        proposed_transactions: Vec<Hash>,
        proposer_transaction: Transaction,
    ) -> Self {
        let proposer_address = keypair.address();
        let sender_address = proposer_address;
        let vote = VotingHole::Yes;
        let phase = VotingPhase::Init;
        let proposer_confirmed_time = Timestamp::now();
        let payload = Self::signing_payload(
            &proposer_address,
            &sender_address,
            &round,
            phase,
            vote,
            &proposed_transactions,
            &Some(proposer_transaction.clone()),
            proposer_confirmed_time,
        );
        let hash = Hash::from_bytes(&payload);
        let signature = keypair.sign_with_network_id(network_id, hash.as_bytes());
        Self {
            hash,
            signature,
            proposer_address,
            sender_address,
            round,
            phase,
            vote,
            proposed_transactions,
            proposer_transaction: Some(proposer_transaction),
            proposer_confirmed_time,
        }
    }

    /// Build and sign a ballot from scratch rather than deriving it from one already
    /// on hand. Used when a phase timeout fires and the local node has to cast its
    /// own vote for a round without an existing ballot instance to copy fields from.
    #[allow(clippy::too_many_arguments)]
    pub fn new_vote(
        keypair: &KeyPair,
        network_id: &[u8],
        proposer_address: Address,
        round: Round,
        phase: VotingPhase,
        vote: VotingHole,
        proposed_transactions: Vec<Hash>,
        proposer_transaction: Option<Transaction>,
        proposer_confirmed_time: Timestamp,
    ) -> Self {
        let sender_address = keypair.address();
        let payload = Self::signing_payload(
            &proposer_address,
            &sender_address,
            &round,
            phase,
            vote,
            &proposed_transactions,
            &proposer_transaction,
            proposer_confirmed_time,
        );
        let hash = Hash::from_bytes(&payload);
        let signature = keypair.sign_with_network_id(network_id, hash.as_bytes());
        Self {
            hash,
            signature,
            proposer_address,
            sender_address,
            round,
            phase,
            vote,
            proposed_transactions,
            proposer_transaction,
            proposer_confirmed_time,
        }
    }

    /// Derive a new ballot from this one with a different sender, phase, and vote,
    /// re-signed by `keypair`. Used when a validator echoes its own vote on a ballot
    /// it received.
    pub fn derive(
        &self,
        keypair: &KeyPair,
        network_id: &[u8],
        phase: VotingPhase,
        vote: VotingHole,
    ) -> Self {
        let sender_address = keypair.address();
        let payload = Self::signing_payload(
            &self.proposer_address,
            &sender_address,
            &self.round,
            phase,
            vote,
            &self.proposed_transactions,
            &self.proposer_transaction,
            self.proposer_confirmed_time,
        );
        let hash = Hash::from_bytes(&payload);
        let signature = keypair.sign_with_network_id(network_id, hash.as_bytes());
        Self {
            hash,
            signature,
            proposer_address: self.proposer_address,
            sender_address,
            round: self.round,
            phase,
            vote,
            proposed_transactions: self.proposed_transactions.clone(),
            proposer_transaction: self.proposer_transaction.clone(),
            proposer_confirmed_time: self.proposer_confirmed_time,
        }
    }

    pub fn is_from_proposer(&self) -> bool {
        self.sender_address == self.proposer_address
    }

    /// Hash identifying the proposed content of this ballot: the set of proposed
    /// transaction hashes plus the proposer transaction. Two ballots for the same round
    /// carrying different proposed content get distinct hashes, so their votes are never
    /// tallied together.
    pub fn message_hash(&self) -> Hash {
        #[derive(Serialize)]
        struct Payload<'a> {
            round: &'a Round,
            proposed_transactions: &'a [Hash],
            proposer_transaction_hash: Option<Hash>,
        }
        let payload = Payload {
            round: &self.round,
            proposed_transactions: &self.proposed_transactions,
            proposer_transaction_hash: self.proposer_transaction.as_ref().map(|t| t.hash()),
        };
        let encoded = bincode::serialize(&payload).expect("ballot message payload always serializes");
        Hash::from_bytes(&encoded)
    }

    /// Recompute the hash over the signed fields and check it, then verify the signature
    /// under `sender_address`.
    pub fn verify(&self, network_id: &[u8]) -> Result<(), crate::error::NodeError> {
        let payload = Self::signing_payload(
            &self.proposer_address,
            &self.sender_address,
            &self.round,
            self.phase,
            self.vote,
            &self.proposed_transactions,
            &self.proposer_transaction,
            self.proposer_confirmed_time,
        );
        let recomputed = Hash::from_bytes(&payload);
        if recomputed != self.hash {
            return Err(crate::error::NodeError::HashDoesNotMatch);
        }
        self.signature
            .verify(&self.sender_address, network_id, self.hash.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Amount;

    fn keypair() -> KeyPair {
        let mut rng = rand_core::OsRng;
        KeyPair::generate(&mut rng)
    }

    fn proposer_tx(kp: &KeyPair) -> Transaction {
        Transaction::new_signed(kp, b"net", Amount::zero(), 0, vec![])
    }

    #[test]
    fn proposal_ballot_verifies() {
        let kp = keypair();
        let tx = proposer_tx(&kp);
        let ballot =
        Ballot::new_proposal(&kp, b"net", Round::genesis(), vec![Hash::from_bytes(b"t1")], tx);
        assert!(ballot.verify(b"net").is_ok());
        assert!(ballot.is_from_proposer());
    }

    #[test]
    fn derived_ballot_has_new_sender_and_verifies() {
        let proposer = keypair();
        let voter = keypair();
        let tx = proposer_tx(&proposer);
        let ballot = Ballot::new_proposal(
            &proposer,
            b"net",
            Round::genesis(),
            vec![Hash::from_bytes(b"t1")],
            tx,
        );
        let signed = ballot.derive(&voter, b"net", VotingPhase::Sign, VotingHole::Yes);
        assert_eq!(signed.sender_address, voter.address());
        assert!(!signed.is_from_proposer());
        assert!(signed.verify(b"net").is_ok());
    }
}
