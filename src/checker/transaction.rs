use std::collections::HashSet;

use crate::error::{NodeError, NodeResult};
use crate::types::TypeTargetKey;

use super::{CheckerContext, CheckerStep, StepOutcome};

/// The transaction checker chain: nine steps run in order before a
/// transaction is admitted to the pool or counted inside a proposed ballot.
pub const CHAIN: &[CheckerStep] = &[
    check_hash_matches,
    check_signature,
    check_not_already_saved,
    check_source_account_exists,
    check_sequence_id,
    check_operations_not_empty,
    check_no_duplicate_operation_targets,
    check_operations_well_formed,
    check_balance_covers_fee_and_amount,
];

fn check_hash_matches(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let tx = ctx.transaction()?;
    if tx.body.make_hash() != tx.header.hash {
        return Err(NodeError::HashDoesNotMatch);
    }
    Ok(StepOutcome::Continue)
}

fn check_signature(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let tx = ctx.transaction()?;
    tx.header
        .signature
        .verify(&tx.body.source, &ctx.network_id, tx.header.hash.as_bytes())?;
    Ok(StepOutcome::Continue)
}

fn check_not_already_saved(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let hash = ctx.transaction()?.hash();
    if ctx.storage.get_block_transaction(&hash)?.is_some() {
        return Err(NodeError::AlreadySaved);
    }
    if ctx.pool.contains(&hash) {
        return Ok(StepOutcome::Stop("already in pool"));
    }
    Ok(StepOutcome::Continue)
}

fn check_source_account_exists(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let source = ctx.transaction()?.source();
    if ctx.storage.get_account(&source)?.is_none() {
        return Err(NodeError::BlockAccountDoesNotExist(source.to_string()));
    }
    Ok(StepOutcome::Continue)
}

fn check_sequence_id(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let tx = ctx.transaction()?;
    let account = ctx
        .storage
        .get_account(&tx.source())?
        .ok_or_else(|| NodeError::BlockAccountDoesNotExist(tx.source().to_string()))?;
    if tx.sequence_id() != account.next_sequence_id() {
        return Err(NodeError::SequenceIdMismatch {
                expected: account.next_sequence_id(),
                got: tx.sequence_id(),
        });
    }
    Ok(StepOutcome::Continue)
}

fn check_operations_not_empty(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let tx = ctx.transaction()?;
    if tx.body.operations.is_empty() {
        return Err(NodeError::InvalidOperation(
                "transaction carries no operations".to_string(),
        ));
    }
    Ok(StepOutcome::Continue)
}

fn check_no_duplicate_operation_targets(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let tx = ctx.transaction()?;
    let mut seen = HashSet::new();
    for op in &tx.body.operations {
        let key = TypeTargetKey(op.op_type, op.target_address());
        if !seen.insert(key) {
            return Err(NodeError::DuplicatedOperation);
        }
    }
    Ok(StepOutcome::Continue)
}

fn check_operations_well_formed(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let tx = ctx.transaction()?;
    let source = tx.source();
    for op in &tx.body.operations {
        op.is_well_formed(&source)?;
    }
    Ok(StepOutcome::Continue)
}

fn check_balance_covers_fee_and_amount(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let tx = ctx.transaction()?;
    let required_fee =
    crate::types::Amount::from_gon(ctx.base_fee.gon() * tx.body.operations.len() as u64);
    if tx.fee() < required_fee {
        return Err(NodeError::InvalidFee(format!(
                    "fee {} below required {}",
                    tx.fee(),
                    required_fee
        )));
    }

    let account = ctx
        .storage
        .get_account(&tx.source())?
        .ok_or_else(|| NodeError::BlockAccountDoesNotExist(tx.source().to_string()))?;
    let required = tx
        .fee()
        .checked_add(tx.total_amount())
        .ok_or_else(|| NodeError::Storage("fee+amount overflow".to_string()))?;
    if account.balance < required {
        return Err(NodeError::InsufficientBalance {
                have: account.balance.gon(),
                need: required.gon(),
        });
    }
    Ok(StepOutcome::Continue)
}
