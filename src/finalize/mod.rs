use crate::crypto::Address;
use crate::error::{NodeError, NodeResult};
use crate::storage::{Batch, Store};
use crate::types::{Amount, Block, BlockAccount, OperationBody, Round, Transaction};

/// Applies a closed round's transactions to account state and writes the resulting
/// block, all inside one atomic batch. Grounded in the original
/// finish-ballot pipeline: apply each proposed transaction's operations, apply the
/// proposer transaction (collected fees and any inflation mint), then commit the
/// block record alongside the mutated accounts.
pub struct Finalizer {
    base_fee: Amount,
    common_account: Address,
}

impl Finalizer {
    pub fn new(base_fee: Amount, common_account: Address) -> Self {
        Self {
            base_fee,
            common_account,
        }
    }

    pub fn base_fee(&self) -> Amount {
        self.base_fee
    }

    pub fn common_account(&self) -> Address {
        self.common_account
    }

    /// Re-validate `round` against storage before applying anything: the height it
    /// targets must be the next one after the local chain's tip, and (past genesis)
    /// its declared previous-block hash must match the actual tip block. A mismatch
    /// means some other finalize already moved the chain past this round.
    fn validate_round(&self, storage: &dyn Store, round: &Round) -> NodeResult<()> {
        let local_height = storage.latest_height()?;
        if round.height != local_height + 1 {
            return Err(NodeError::StaleRound {
                local: local_height,
                ballot: round.height,
            });
        }
        if local_height > 0 {
            let tip = storage
                .block_at_height(local_height)?
                .ok_or_else(|| NodeError::StorageCorruption("missing tip block".to_string()))?;
            if tip.hash != round.previous_block_hash {
                return Err(NodeError::StaleRound {
                    local: local_height,
                    ballot: round.height,
                });
            }
        }
        Ok(())
    }

    /// Finalize one round: re-validate it against the current chain tip, debit/credit
    /// every account touched by `proposed_txs` and `proposer_transaction` (whose
    /// `CollectTxFee`/`Inflation` operations deposit into the common account), and
    /// persist the resulting block. All writes land in a single `Store::commit` call.
    pub fn finalize(
        &self,
        storage: &dyn Store,
        round: Round,
        proposer: Address,
        proposed_txs: Vec<Transaction>,
        proposer_transaction: Transaction,
    ) -> NodeResult<Block> {
        self.validate_round(storage, &round)?;

        let mut batch = storage.new_batch();
        let mut total_ops = 0u64;
        let mut tx_hashes = Vec::with_capacity(proposed_txs.len());

        for tx in &proposed_txs {
            self.apply_transaction(storage, batch.as_mut(), tx)?;
            batch.put_block_transaction(&tx.hash(), tx)?;
            batch.remove_pending_transaction(&tx.hash())?;
            batch.append_account_transaction_index(&tx.source(), &tx.hash())?;
            for op in &tx.body.operations {
                batch.append_account_operation_index(&op.target_address(), &tx.hash())?;
            }
            total_ops += tx.body.operations.len() as u64;
            tx_hashes.push(tx.hash());
        }

        self.apply_transaction(storage, batch.as_mut(), &proposer_transaction)?;
        for op in &proposer_transaction.body.operations {
            batch.append_account_operation_index(&op.target_address(), &proposer_transaction.hash())?;
        }

        let block = Block::new(
            round,
            proposer,
            tx_hashes,
            proposer_transaction.hash(),
            total_ops,
        );
        batch.put_block(&block)?;
        storage.commit(batch)?;
        Ok(block)
    }

    fn apply_transaction(&self, storage: &dyn Store, batch: &mut dyn Batch, tx: &Transaction) -> NodeResult<()> {
        let mut source = storage
            .get_account(&tx.source())?
            .ok_or_else(|| NodeError::BlockAccountDoesNotExist(tx.source().to_string()))?;
        source.withdraw(tx.fee())?;
        source.advance_sequence();

        for op in &tx.body.operations {
            self.apply_operation(storage, batch, &mut source, op)?;
        }

        batch.put_account(&source)?;
        Ok(())
    }

    fn apply_operation(
        &self,
        storage: &dyn Store,
        batch: &mut dyn Batch,
        source: &mut BlockAccount,
        op: &crate::types::Operation,
    ) -> NodeResult<()> {
        match &op.body {
            OperationBody::CreateAccount(body) => {
                source.withdraw(body.amount)?;
                let mut target = storage
                    .get_account(&body.target)?
                    .unwrap_or_else(|| BlockAccount::new(body.target, Amount::zero(), body.linked));
                target.deposit(body.amount)?;
                batch.put_account(&target)?;
            }
            OperationBody::Payment(body) => {
                source.withdraw(body.amount)?;
                let mut target = storage
                    .get_account(&body.target)?
                    .ok_or_else(|| NodeError::BlockAccountDoesNotExist(body.target.to_string()))?;
                target.deposit(body.amount)?;
                batch.put_account(&target)?;
            }
            OperationBody::UnfreezeRequest(body) => {
                let mut target = storage
                    .get_account(&body.target)?
                    .ok_or_else(|| NodeError::BlockAccountDoesNotExist(body.target.to_string()))?;
                target.frozen = false;
                batch.put_account(&target)?;
            }
            OperationBody::InflationPF(body) => {
                let mut funding = storage
                    .get_account(&body.funding_address)?
                    .unwrap_or_else(|| BlockAccount::new(body.funding_address, Amount::zero(), None));
                funding.deposit(body.amount)?;
                batch.put_account(&funding)?;
            }
            OperationBody::CollectTxFee(body) => {
                let mut common = storage
                    .get_account(&body.common_account)?
                    .unwrap_or_else(|| BlockAccount::new(body.common_account, Amount::zero(), None));
                common.deposit(body.amount)?;
                batch.put_account(&common)?;
            }
            OperationBody::Inflation(body) => {
                let mut common = storage
                    .get_account(&body.common_account)?
                    .unwrap_or_else(|| BlockAccount::new(body.common_account, Amount::zero(), None));
                common.deposit(body.amount)?;
                batch.put_account(&common)?;
            }
            OperationBody::CongressVoting(_) | OperationBody::CongressVotingResult(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::storage::MemoryStore;
    use crate::types::{Hash, Operation};

    fn addr() -> Address {
        let mut rng = rand_core::OsRng;
        KeyPair::generate(&mut rng).address()
    }

    #[test]
    fn finalize_applies_payment_and_collects_fee() {
        let storage = MemoryStore::new();
        let common = addr();
        let finalizer = Finalizer::new(Amount::from_gon(10_000), common);

        let source_kp = KeyPair::generate(&mut rand_core::OsRng);
        let source = source_kp.address();
        let target = addr();

        let mut batch = storage.new_batch();
        batch
            .put_account(&BlockAccount::new(source, Amount::from_gon(1_000_000), None))
            .unwrap();
        batch
            .put_account(&BlockAccount::new(target, Amount::zero(), None))
            .unwrap();
        storage.commit(batch).unwrap();

        let tx = Transaction::new_signed(
            &source_kp,
            b"net",
            Amount::from_gon(10_000),
            1,
            vec![Operation::payment(target, Amount::from_gon(500))],
        );
        let proposer_kp = KeyPair::generate(&mut rand_core::OsRng);
        let ptx = Transaction::new_signed(
            &proposer_kp,
            b"net",
            Amount::zero(),
            0,
            vec![Operation::collect_tx_fee(common, Amount::from_gon(10_000))],
        );
        storage
            .commit({
                let mut b = storage.new_batch();
                b.put_account(&BlockAccount::new(proposer_kp.address(), Amount::zero(), None))
                    .unwrap();
                b
        })
            .unwrap();

        let block = finalizer
            .finalize(&storage, Round::genesis(), proposer_kp.address(), vec![tx], ptx)
            .unwrap();

        assert_eq!(block.total_txs, 1);
        let target_account = storage.get_account(&target).unwrap().unwrap();
        assert_eq!(target_account.balance, Amount::from_gon(500));
        let source_account = storage.get_account(&source).unwrap().unwrap();
        assert_eq!(source_account.balance, Amount::from_gon(1_000_000 - 10_000 - 500));
        assert_eq!(source_account.sequence_id, 1);
        let common_account = storage.get_account(&common).unwrap().unwrap();
        assert_eq!(common_account.balance, Amount::from_gon(10_000));
    }

    #[test]
    fn finalize_mints_inflation_into_common_account() {
        let storage = MemoryStore::new();
        let common = addr();
        let finalizer = Finalizer::new(Amount::from_gon(10_000), common);

        let proposer_kp = KeyPair::generate(&mut rand_core::OsRng);
        storage
            .commit({
                let mut b = storage.new_batch();
                b.put_account(&BlockAccount::new(proposer_kp.address(), Amount::zero(), None))
                    .unwrap();
                b
        })
            .unwrap();

        let ptx = Transaction::new_signed(
            &proposer_kp,
            b"net",
            Amount::zero(),
            0,
            vec![Operation::inflation(common, Amount::from_gon(1_000))],
        );

        finalizer
            .finalize(&storage, Round::genesis(), proposer_kp.address(), vec![], ptx)
            .unwrap();

        let common_account = storage.get_account(&common).unwrap().unwrap();
        assert_eq!(common_account.balance, Amount::from_gon(1_000));
    }

    #[test]
    fn finalize_rejects_round_whose_previous_hash_does_not_match_tip() {
        let storage = MemoryStore::new();
        let common = addr();
        let finalizer = Finalizer::new(Amount::from_gon(10_000), common);
        let proposer_kp = KeyPair::generate(&mut rand_core::OsRng);
        storage
            .commit({
                let mut b = storage.new_batch();
                b.put_account(&BlockAccount::new(proposer_kp.address(), Amount::zero(), None))
                    .unwrap();
                b
        })
            .unwrap();

        let block = Block::new(Round::genesis(), proposer_kp.address(), vec![], Hash::from_bytes(b"ptx0"), 0);
        storage
            .commit({
                let mut b = storage.new_batch();
                b.put_block(&block).unwrap();
                b
        })
            .unwrap();

        let mismatched_round = Round::new(2, 0, Hash::from_bytes(b"wrong-previous-hash"));
        let ptx = Transaction::new_signed(&proposer_kp, b"net", Amount::zero(), 1, vec![]);
        let err = finalizer
            .finalize(&storage, mismatched_round, proposer_kp.address(), vec![], ptx)
            .unwrap_err();
        assert!(matches!(err, NodeError::StaleRound { .. }));
    }
}
