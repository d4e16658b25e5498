use serde::{Deserialize, Serialize};

use crate::crypto::{Address, KeyPair, Signature};
use crate::error::NodeError;
use crate::types::operation::Operation;
use crate::types::{Amount, Hash, Timestamp};

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TransactionBody {
    pub source: Address,
    pub fee: Amount,
    pub sequence_id: u64,
    pub operations: Vec<Operation>,
}

impl TransactionBody {
    pub fn make_hash(&self) -> Hash {
        let encoded = bincode::serialize(self).expect("transaction body always serializes");
        Hash::from_bytes(&encoded)
    }

    /// Sum of every operation's moved amount, not including the fee.
    pub fn total_amount(&self) -> Amount {
        self.operations
            .iter()
            .fold(Amount::zero(), |acc, op| acc + op.amount())
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TransactionHeader {
    pub created: Timestamp,
    pub hash: Hash,
    pub signature: Signature,
}

/// A signed transaction: one or more operations submitted by a single source account
/// under one sequence id and one fee.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Transaction {
    pub header: TransactionHeader,
    pub body: TransactionBody,
}

impl Transaction {
    /// Build and sign a new transaction. `fee` must already cover `base_fee * operations.len()`;
    /// the checker chain verifies that, this constructor does not.
    pub fn new_signed(
        keypair: &KeyPair,
        network_id: &[u8],
        fee: Amount,
        sequence_id: u64,
        operations: Vec<Operation>,
    ) -> Self {
        let body = TransactionBody {
            source: keypair.address(),
            fee,
            sequence_id,
            operations,
        };
        let hash = body.make_hash();
        let signature = keypair.sign_with_network_id(network_id, hash.as_bytes());
        Self {
            header: TransactionHeader {
                created: Timestamp::now(),
                hash,
                signature,
            },
            body,
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    pub fn source(&self) -> Address {
        self.body.source
    }

    pub fn sequence_id(&self) -> u64 {
        self.body.sequence_id
    }

    pub fn fee(&self) -> Amount {
        self.body.fee
    }

    pub fn total_amount(&self) -> Amount {
        self.body.total_amount()
    }

    /// Recompute the body hash and check it against the stored header hash, then verify
    /// the signature over that hash under the source address.
    pub fn verify(&self, network_id: &[u8]) -> Result<(), NodeError> {
        if self.body.make_hash() != self.header.hash {
            return Err(NodeError::HashDoesNotMatch);
        }
        self.header
            .signature
            .verify(&self.body.source, network_id, self.header.hash.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn keypair() -> KeyPair {
        let mut rng = rand_core::OsRng;
        KeyPair::generate(&mut rng)
    }

    #[test]
    fn signed_transaction_verifies() {
        let kp = keypair();
        let target = keypair().address();
        let tx = Transaction::new_signed(
            &kp,
            b"test-network",
            Amount::from_gon(10_000),
            1,
            vec![Operation::payment(target, Amount::from_gon(500))],
        );
        assert!(tx.verify(b"test-network").is_ok());
    }

    #[test]
    fn tampered_body_fails_hash_check() {
        let kp = keypair();
        let target = keypair().address();
        let mut tx = Transaction::new_signed(
            &kp,
            b"test-network",
            Amount::from_gon(10_000),
            1,
            vec![Operation::payment(target, Amount::from_gon(500))],
        );
        tx.body.sequence_id = 2;
        assert!(matches!(
                tx.verify(b"test-network"),
                Err(NodeError::HashDoesNotMatch)
        ));
    }

    #[test]
    fn total_amount_sums_operations() {
        let target = keypair().address();
        let body = TransactionBody {
            source: keypair().address(),
            fee: Amount::from_gon(20_000),
            sequence_id: 1,
            operations: vec![
                Operation::payment(target, Amount::from_gon(100)),
                Operation::payment(target, Amount::from_gon(200)),
            ],
        };
        assert_eq!(body.total_amount(), Amount::from_gon(300));
    }
}
