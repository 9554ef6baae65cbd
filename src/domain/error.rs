//! Contract-level errors.
//!
//! Display strings follow the platform's panic-message style so they read
//! the same in logs as they would in a failed receipt.

use thiserror::Error;

use super::units::{Balance, Gas};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("NO_TOKENS_PROVIDED")]
    NoTokensProvided,

    #[error("POOL_IDS_TOKENS_LEN_MISMATCH: {tokens} tokens, {pool_ids} pool ids")]
    PoolIdsTokensLenMismatch { tokens: usize, pool_ids: usize },

    #[error("TOKEN_AMOUNTS_LENGTH_IS_INCORRECT: expected {expected}, got {got}")]
    TokenAmountsLengthIsIncorrect { expected: usize, got: usize },

    #[error("NEAR_AMOUNTS_LEN_MISMATCH: expected {expected}, got {got}")]
    NearAmountsLenMismatch { expected: usize, got: usize },

    #[error("DUPLICATE_TOKEN: {0}")]
    DuplicateToken(String),

    #[error("INSUFFICIENT_DEPOSIT: attached {attached}, required {required}")]
    InsufficientDeposit { attached: Balance, required: Balance },

    #[error("GAS_BUDGET_EXCEEDED: {stage} needs {needed}, budget {budget}")]
    GasBudgetExceeded { stage: &'static str, needed: Gas, budget: Gas },

    #[error("ALREADY_INITIALIZED")]
    AlreadyInitialized,

    #[error("CONTRACT_IS_NOT_INITIALIZED")]
    NotInitialized,

    #[error("INDEX_ALREADY_EXISTS: {0}")]
    IndexAlreadyExists(String),

    #[error("Requires attached deposit of exactly 1 yoctoNEAR")]
    OneYoctoRequired,

    #[error("Method {0} is private")]
    PrivateMethod(&'static str),

    #[error("SLOT_MISMATCH: {0}")]
    SlotMismatch(String),

    #[error("SLOT_FAILED: swap for {token} (slot {slot}) did not succeed")]
    SlotFailed { slot: usize, token: String },

    #[error("SLOT_DECODE: swap result for {token} (slot {slot}) is not a U128: {reason}")]
    SlotDecode { slot: usize, token: String, reason: String },

    #[error("SWAP_OUTPUT_TOO_LOW: {token} returned {got}, need {need}")]
    SwapOutputTooLow { token: String, got: Balance, need: Balance },

    #[error("The account {0} is not registered")]
    AccountNotRegistered(String),

    #[error("The account doesn't have enough balance: {balance} < {amount}")]
    InsufficientBalance { balance: Balance, amount: Balance },

    #[error("The amount should be a positive number")]
    ZeroAmount,

    #[error("Sender and receiver should be different")]
    SelfTransfer,

    #[error("Total supply overflow")]
    SupplyOverflow,

    #[error("Balance overflow")]
    BalanceOverflow,

    #[error("Invalid account id: {0:?}")]
    InvalidAccountId(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Invalid arguments for {method}: {reason}")]
    InvalidArgs { method: String, reason: String },

    #[error("Method {0} not found")]
    MethodNotFound(String),

    #[error("Call graph: {0}")]
    Graph(String),
}

pub type ContractResult<T> = Result<T, ContractError>;
