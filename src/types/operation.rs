use serde::{Deserialize, Serialize};

use crate::crypto::Address;
use crate::error::NodeError;
use crate::types::Amount;

/// The operation types a transaction body may carry. `CollectTxFee` and `Inflation`
/// only ever appear inside a proposer transaction, never in a client-submitted one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum OperationType {
    CreateAccount,
    Payment,
    CongressVoting,
    CongressVotingResult,
    UnfreezeRequest,
    InflationPF,
    CollectTxFee,
    Inflation,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationType::CreateAccount => "create-account",
            OperationType::Payment => "payment",
            OperationType::CongressVoting => "congress-voting",
            OperationType::CongressVotingResult => "congress-voting-result",
            OperationType::UnfreezeRequest => "unfreeze-request",
            OperationType::InflationPF => "inflation-pf",
            OperationType::CollectTxFee => "collect-tx-fee",
            OperationType::Inflation => "inflation",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CreateAccountBody {
    pub target: Address,
    pub amount: Amount,
    pub linked: Option<Address>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PaymentBody {
    pub target: Address,
    pub amount: Amount,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CongressVotingBody {
    pub contract: Address,
    pub ballot: Vec<u8>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CongressVotingResultBody {
    pub contract: Address,
    pub result: Vec<u8>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct UnfreezeRequestBody {
    pub target: Address,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct InflationPfBody {
    pub funding_address: Address,
    pub amount: Amount,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CollectTxFeeBody {
    pub common_account: Address,
    pub amount: Amount,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct InflationBody {
    pub common_account: Address,
    pub amount: Amount,
}

/// The operation body, its shape depending on `OperationType`.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub enum OperationBody {
    CreateAccount(CreateAccountBody),
    Payment(PaymentBody),
    CongressVoting(CongressVotingBody),
    CongressVotingResult(CongressVotingResultBody),
    UnfreezeRequest(UnfreezeRequestBody),
    InflationPF(InflationPfBody),
    CollectTxFee(CollectTxFeeBody),
    Inflation(InflationBody),
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Operation {
    pub op_type: OperationType,
    pub body: OperationBody,
}

impl Operation {
    pub fn create_account(target: Address, amount: Amount, linked: Option<Address>) -> Self {
        Self {
            op_type: OperationType::CreateAccount,
            body: OperationBody::CreateAccount(CreateAccountBody {
                    target,
                    amount,
                    linked,
            }),
        }
    }

    pub fn payment(target: Address, amount: Amount) -> Self {
        Self {
            op_type: OperationType::Payment,
            body: OperationBody::Payment(PaymentBody { target, amount }),
        }
    }

    pub fn unfreeze_request(target: Address) -> Self {
        Self {
            op_type: OperationType::UnfreezeRequest,
            body: OperationBody::UnfreezeRequest(UnfreezeRequestBody { target }),
        }
    }

    pub fn inflation_pf(funding_address: Address, amount: Amount) -> Self {
        Self {
            op_type: OperationType::InflationPF,
            body: OperationBody::InflationPF(InflationPfBody {
                    funding_address,
                    amount,
            }),
        }
    }

    /// Proposer-only: deposits the round's collected fees into the common account.
    pub fn collect_tx_fee(common_account: Address, amount: Amount) -> Self {
        Self {
            op_type: OperationType::CollectTxFee,
            body: OperationBody::CollectTxFee(CollectTxFeeBody {
                common_account,
                amount,
            }),
        }
    }

    /// Proposer-only: mints new supply into the common account for this round.
    pub fn inflation(common_account: Address, amount: Amount) -> Self {
        Self {
            op_type: OperationType::Inflation,
            body: OperationBody::Inflation(InflationBody {
                common_account,
                amount,
            }),
        }
    }

    /// The address this operation targets, used for the duplicate `(type, target)` check.
    pub fn target_address(&self) -> Address {
        match &self.body {
            OperationBody::CreateAccount(b) => b.target,
            OperationBody::Payment(b) => b.target,
            OperationBody::CongressVoting(b) => b.contract,
            OperationBody::CongressVotingResult(b) => b.contract,
            OperationBody::UnfreezeRequest(b) => b.target,
            OperationBody::InflationPF(b) => b.funding_address,
            OperationBody::CollectTxFee(b) => b.common_account,
            OperationBody::Inflation(b) => b.common_account,
        }
    }

    /// The amount moved by this operation, if any (used for fee+amount balance checks).
    pub fn amount(&self) -> Amount {
        match &self.body {
            OperationBody::CreateAccount(b) => b.amount,
            OperationBody::Payment(b) => b.amount,
            OperationBody::InflationPF(b) => b.amount,
            OperationBody::CollectTxFee(b) => b.amount,
            OperationBody::Inflation(b) => b.amount,
            OperationBody::CongressVoting(_)
            | OperationBody::CongressVotingResult(_)
            | OperationBody::UnfreezeRequest(_) => Amount::zero(),
        }
    }

    /// Structural well-formedness of this single operation. `source` is the owning
    /// transaction's source account: every operation must target some other account.
    pub fn is_well_formed(&self, source: &Address) -> Result<(), NodeError> {
        if self.target_address() == *source {
            return Err(NodeError::InvalidOperation(
                "operation target cannot equal its source account".to_string(),
            ));
        }
        match &self.body {
            OperationBody::CreateAccount(b) => {
                if let Some(linked) = b.linked {
                    if linked == b.target {
                        return Err(NodeError::InvalidOperation(
                                "linked account cannot equal target".to_string(),
                        ));
                    }
                }
                Ok(())
            }
            OperationBody::InflationPF(_) | OperationBody::Payment(_) => Ok(()),
            OperationBody::CongressVoting(_)
            | OperationBody::CongressVotingResult(_)
            | OperationBody::UnfreezeRequest(_) => Ok(()),
            OperationBody::CollectTxFee(_) | OperationBody::Inflation(_) => Ok(()),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeTargetKey(pub OperationType, pub Address);
