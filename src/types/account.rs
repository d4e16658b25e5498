use serde::{Deserialize, Serialize};

use crate::crypto::Address;
use crate::error::NodeError;
use crate::types::Amount;

/// On-chain account state. `sequence_id` is the next sequence id this
/// account's source transactions must use; `frozen` accounts cannot spend until
/// unfrozen by an `UnfreezeRequest`.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct BlockAccount {
    pub address: Address,
    pub balance: Amount,
    pub sequence_id: u64,
    pub linked_to: Option<Address>,
    pub frozen: bool,
}

impl BlockAccount {
    pub fn new(address: Address, balance: Amount, linked_to: Option<Address>) -> Self {
        Self {
            address,
            balance,
            sequence_id: 0,
            linked_to,
            frozen: false,
        }
    }

    pub fn deposit(&mut self, amount: Amount) -> Result<(), NodeError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| NodeError::Storage("balance overflow".to_string()))?;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Amount) -> Result<(), NodeError> {
        if self.frozen {
            return Err(NodeError::InvalidOperation(format!(
                        "account {} is frozen",
                        self.address
            )));
        }
        self.balance = self.balance.checked_sub(amount).ok_or(NodeError::InsufficientBalance {
                have: self.balance.gon(),
                need: amount.gon(),
        })?;
        Ok(())
    }

    pub fn next_sequence_id(&self) -> u64 {
        self.sequence_id + 1
    }

    pub fn advance_sequence(&mut self) {
        self.sequence_id += 1;
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
    fn withdraw_fails_on_insufficient_balance() {
        let mut acc = BlockAccount::new(addr(), Amount::from_gon(100), None);
        let err = acc.withdraw(Amount::from_gon(200)).unwrap_err();
        assert!(matches!(err, NodeError::InsufficientBalance {.. }));
    }

    #[test]
    fn withdraw_fails_when_frozen() {
        let mut acc = BlockAccount::new(addr(), Amount::from_gon(100), None);
        acc.frozen = true;
        assert!(acc.withdraw(Amount::from_gon(10)).is_err());
    }

    #[test]
    fn deposit_then_withdraw_round_trips_balance() {
        let mut acc = BlockAccount::new(addr(), Amount::zero(), None);
        acc.deposit(Amount::from_gon(500)).unwrap();
        acc.withdraw(Amount::from_gon(200)).unwrap();
        assert_eq!(acc.balance, Amount::from_gon(300));
    }
}
