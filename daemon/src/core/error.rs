use thiserror::Error;

use abacus_common::{
    block::BlockError, contract::ContractError, crypto::Address, transaction::TransactionError,
};

#[derive(Debug, Error)]
pub enum BlockchainError {
    /// A concurrent `create_block` is still running.
    #[error("a block is already being created")]
    AlreadyMining,

    #[error("transaction has no sender")]
    MissingSender,

    #[error("transaction endpoints must be distinct")]
    SameEndpoints,

    #[error("transfers require a positive amount")]
    ZeroAmount,

    #[error("transaction signature is missing or invalid")]
    InvalidSignature,

    #[error("unknown contract {0}")]
    UnknownContract(Address),

    /// Caller is not entitled to act on the target, e.g. deploying a
    /// contract created by someone else.
    #[error("caller is not authorized")]
    Ownership,

    #[error("insufficient stake: need {need}, have {have}")]
    InsufficientStake { need: u64, have: u64 },

    #[error("operation requires a proof-of-stake chain")]
    NotProofOfStake,

    /// Internal assertion failure; aborts the current operation.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Contract(#[from] ContractError),
}
