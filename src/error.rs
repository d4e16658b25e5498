use thiserror::Error;

/// The error taxonomy for the consensus core and its ambient stack.
///
/// Variants are grouped by kind (validation / consensus / storage / transport / fatal) so
/// that both logging level and HTTP status can be derived from `kind()` without a second
/// big match at the call site.
#[derive(Error, Debug)]
pub enum NodeError {
    // --- Validation ---
    #[error("bad public address: {0}")]
    BadPublicAddress(String),
    #[error("invalid fee: {0}")]
    InvalidFee(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("duplicated operation for type/target pair")]
    DuplicatedOperation,
    #[error("hash does not match")]
    HashDoesNotMatch,
    #[error("bad signature")]
    BadSignature,
    #[error("sequence id mismatch: expected {expected}, got {got}")]
    SequenceIdMismatch { expected: u64, got: u64 },

    // --- Consensus ---
    #[error("ballot already saved")]
    AlreadySaved,
    #[error("stale round: local height {local}, ballot height {ballot}")]
    StaleRound { local: u64, ballot: u64 },
    #[error("unknown validator: {0}")]
    UnknownValidator(String),
    /// Cooperative early-return: "this checker chain reached its natural end".
    /// Not a failure — callers must not log this as an error.
    #[error("checker stop: {0}")]
    CheckerStop(&'static str),

    // --- Storage ---
    #[error("block account does not exist: {0}")]
    BlockAccountDoesNotExist(String),
    #[error("block account already exists: {0}")]
    BlockAccountAlreadyExists(String),
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),
    /// Committing an already-committed batch. Treated as success by callers.
    #[error("batch not committable")]
    NotCommittable,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    // --- Transport ---
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("request timed out")]
    TimedOut,
    #[error("network error: {0}")]
    Network(String),

    // --- Fatal ---
    #[error("unknown operation type: {0}")]
    UnknownOperationType(String),
    #[error("storage corruption: {0}")]
    StorageCorruption(String),
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The coarse-grained kind used to pick a log level and an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Consensus,
    Storage,
    Transport,
    Fatal,
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        use NodeError::*;
        match self {
            BadPublicAddress(_)
            | InvalidFee(_)
            | InvalidOperation(_)
            | DuplicatedOperation
            | HashDoesNotMatch
            | BadSignature
            | SequenceIdMismatch { .. } => ErrorKind::Validation,

            AlreadySaved | StaleRound { .. } | UnknownValidator(_) | CheckerStop(_) => {
                ErrorKind::Consensus
            }

            BlockAccountDoesNotExist(_)
            | BlockAccountAlreadyExists(_)
            | TransactionNotFound(_)
            | NotCommittable
            | Storage(_)
            | InsufficientBalance { .. } => ErrorKind::Storage,

            BadRequest(_) | TimedOut | Network(_) => ErrorKind::Transport,

            UnknownOperationType(_) | StorageCorruption(_) | Configuration(_) | Io(_)
            | Serialization(_) | Json(_) => ErrorKind::Fatal,
        }
    }

    /// HTTP status for API problem+json responses.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Transport => 400,
            ErrorKind::Storage => match self {
                NodeError::TransactionNotFound(_)
                | NodeError::BlockAccountDoesNotExist(_) => 404,
                _ => 500,
            },
            ErrorKind::Consensus => 409,
            ErrorKind::Fatal => 500,
        }
    }

    pub fn is_checker_stop(&self) -> bool {
        matches!(self, NodeError::CheckerStop(_))
    }
}

impl From<rocksdb::Error> for NodeError {
    fn from(e: rocksdb::Error) -> Self {
        NodeError::Storage(e.to_string())
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
