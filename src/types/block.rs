use serde::{Deserialize, Serialize};

use crate::crypto::Address;
use crate::types::{Hash, Round, Timestamp};

/// A committed block: the record a round's ALL-CONFIRMed ballot is finalized into.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Block {
    pub hash: Hash,
    pub height: u64,
    pub round: Round,
    pub proposer: Address,
    pub transactions: Vec<Hash>,
    pub proposer_transaction_hash: Hash,
    pub confirmed_time: Timestamp,
    pub total_txs: u64,
    pub total_ops: u64,
}

impl Block {
    pub fn new(
        round: Round,
        proposer: Address,
        transactions: Vec<Hash>,
        proposer_transaction_hash: Hash,
        total_ops: u64,
    ) -> Self {
        let total_txs = transactions.len() as u64;
        #[derive(Serialize)]
        struct Payload<'a> {
            round: &'a Round,
            proposer: &'a Address,
            transactions: &'a [Hash],
            proposer_transaction_hash: &'a Hash,
        }
        let payload = Payload {
            round: &round,
            proposer: &proposer,
            transactions: &transactions,
            proposer_transaction_hash: &proposer_transaction_hash,
        };
        let encoded = bincode::serialize(&payload).expect("block payload always serializes");
        let hash = Hash::from_bytes(&encoded);
        Self {
            hash,
            height: round.height,
            round,
            proposer,
            transactions,
            proposer_transaction_hash,
            confirmed_time: Timestamp::now(),
            total_txs,
            total_ops,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_hash_is_deterministic_given_same_fields() {
        let round = Round::genesis();
        let proposer = crate::crypto::Address::parse(
            &{
                let mut rng = rand_core::OsRng;
                crate::crypto::KeyPair::generate(&mut rng).address().to_string()
            },
        )
            .unwrap();
        let txs = vec![Hash::from_bytes(b"t1"), Hash::from_bytes(b"t2")];
        let ptx_hash = Hash::from_bytes(b"ptx");
        let a = Block::new(round, proposer, txs.clone(), ptx_hash, 2);
        let b = Block::new(round, proposer, txs, ptx_hash, 2);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.total_txs, 2);
    }
}
