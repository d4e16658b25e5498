use std::collections::HashSet;

use crate::error::{NodeError, NodeResult};

use super::{CheckerContext, CheckerStep, StepOutcome};

/// The ballot checker chain: steps run in order on every inbound ballot before it
/// reaches the consensus engine's vote tally.
pub const CHAIN: &[CheckerStep] = &[
    check_hash_matches,
    check_signature,
    check_sender_is_validator,
    check_proposer_is_validator,
    check_round_not_stale,
    check_proposed_transactions_no_duplicates,
    check_message_is_new,
    check_proposer_transaction_present_on_init,
    check_proposer_transaction_valid,
    check_not_already_committed,
];

fn check_hash_matches(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let ballot = ctx.ballot()?;
    ballot.verify(&ctx.network_id)?;
    Ok(StepOutcome::Continue)
}

fn check_signature(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    // `verify` above already checks both hash and signature; this step exists as its
    // own chain entry so a future signature-only re-check (e.g. after a hash cache
    // hit) has somewhere to live without renumbering the chain.
    let ballot = ctx.ballot()?;
    ballot
        .signature
        .verify(&ballot.sender_address, &ctx.network_id, ballot.hash.as_bytes())?;
    Ok(StepOutcome::Continue)
}

/// `ctx.validators` is the full voting set, the local node included, so a node's own
/// proposal or vote passes this check the same way a peer's would.
fn check_sender_is_validator(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let sender = ctx.ballot()?.sender_address;
    if !ctx.validators.contains(&sender) {
        return Err(NodeError::UnknownValidator(sender.to_string()));
    }
    Ok(StepOutcome::Continue)
}

fn check_proposer_is_validator(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let proposer = ctx.ballot()?.proposer_address;
    if !ctx.validators.contains(&proposer) {
        return Err(NodeError::UnknownValidator(proposer.to_string()));
    }
    Ok(StepOutcome::Continue)
}

fn check_round_not_stale(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let round = ctx.ballot()?.round;
    let latest_height = ctx.storage.latest_height()?;
    if round.height <= latest_height {
        return Ok(StepOutcome::Stop("round already committed"));
    }
    Ok(StepOutcome::Continue)
}

fn check_proposed_transactions_no_duplicates(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let ballot = ctx.ballot()?;
    let mut seen = HashSet::new();
    for hash in &ballot.proposed_transactions {
        if !seen.insert(*hash) {
            return Err(NodeError::DuplicatedOperation);
        }
    }
    Ok(StepOutcome::Continue)
}

/// Derives the ballot's message hash (over its proposed content, not sender/vote) and
/// records whether a tally is already running for this exact `(round, messageHash)`
/// pair. `is_new_message` must already be precomputed by the caller against the
/// consensus engine's running tallies; this step just stores the derived hash
/// alongside it so downstream steps and the caller can key off both.
fn check_message_is_new(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let hash = ctx.ballot()?.message_hash();
    ctx.message_hash = Some(hash);
    Ok(StepOutcome::Continue)
}

fn check_proposer_transaction_present_on_init(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let ballot = ctx.ballot()?;
    if ballot.phase == crate::types::VotingPhase::Init && ballot.proposer_transaction.is_none() {
        return Err(NodeError::InvalidOperation(
                "INIT ballot must carry the proposer transaction".to_string(),
        ));
    }
    Ok(StepOutcome::Continue)
}

fn check_proposer_transaction_valid(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let ballot = ctx.ballot()?;
    if let Some(ptx) = &ballot.proposer_transaction {
        ptx.verify(&ctx.network_id)?;
    }
    Ok(StepOutcome::Continue)
}

fn check_not_already_committed(ctx: &mut CheckerContext) -> NodeResult<StepOutcome> {
    let round = ctx.ballot()?.round;
    if ctx.storage.block_at_height(round.height)?.is_some() {
        return Ok(StepOutcome::Stop("height already has a committed block"));
    }
    Ok(StepOutcome::Continue)
}
