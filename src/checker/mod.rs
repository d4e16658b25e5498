pub mod ballot;
pub mod transaction;

use std::sync::Arc;

use crate::crypto::Address;
use crate::error::{NodeError, NodeResult};
use crate::pool::TransactionPool;
use crate::storage::Store;
use crate::types::{Ballot, Hash, Transaction};

/// The value a checker chain is validating. Replaces the untyped context bag the
/// original checker chain threaded its target through with one typed enum, so each
/// step can pattern-match instead of downcasting.
pub enum CheckerTarget {
    Transaction(Transaction),
    Ballot(Ballot),
}

/// Shared state available to every step in a checker chain.
pub struct CheckerContext {
    pub network_id: Vec<u8>,
    pub base_fee: crate::types::Amount,
    pub self_address: Address,
    pub validators: Vec<Address>,
    pub storage: Arc<dyn Store>,
    pub pool: Arc<TransactionPool>,
    pub target: CheckerTarget,
    /// Whether `RunningRounds` already has a tally open for this ballot's
    /// `(round, messageHash)` pair. Precomputed by the caller, since the checker chain
    /// has no direct handle on the consensus engine's tally state.
    pub is_new_message: bool,
    /// Filled in by the ballot chain's `check_message_is_new` step once it derives the
    /// ballot's message hash.
    pub message_hash: Option<Hash>,
}

impl CheckerContext {
    pub fn transaction(&self) -> NodeResult<&Transaction> {
        match &self.target {
            CheckerTarget::Transaction(tx) => Ok(tx),
            CheckerTarget::Ballot(_) => Err(NodeError::InvalidOperation(
                    "checker step expected a transaction target".to_string(),
            )),
        }
    }

    pub fn ballot(&self) -> NodeResult<&Ballot> {
        match &self.target {
            CheckerTarget::Ballot(ballot) => Ok(ballot),
            CheckerTarget::Transaction(_) => Err(NodeError::InvalidOperation(
                    "checker step expected a ballot target".to_string(),
            )),
        }
    }
}

/// What a checker step wants the chain runner to do next.
pub enum StepOutcome {
    Continue,
    /// Stop the chain without error: a cooperative early exit, not a failure (e.g. this
    /// ballot/transaction was already fully processed).
    Stop(&'static str),
}

pub type CheckerStep = fn(&mut CheckerContext) -> NodeResult<StepOutcome>;

/// Run `steps` in order against `ctx`, short-circuiting on the first error or the
/// first cooperative `Stop`.
pub fn run_chain(ctx: &mut CheckerContext, steps: &[CheckerStep]) -> NodeResult<()> {
    for step in steps {
        match step(ctx)? {
            StepOutcome::Continue => continue,
            StepOutcome::Stop(_reason) => return Ok(()),
        }
    }
    Ok(())
}
