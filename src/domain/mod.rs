//! Domain layer - Core types and pure logic.
//!
//! Index baskets, the cross-contract call graph, balances and token
//! bookkeeping. No I/O here (hexagonal architecture inner ring);
//! everything is synchronous and testable in isolation.

pub mod account;
pub mod basket;
pub mod call_graph;
pub mod context;
pub mod error;
pub mod events;
pub mod form;
pub mod ledger;
pub mod metadata;
pub mod report;
pub mod transaction;
pub mod units;
pub mod wire;

// Re-export core types for convenience
pub use account::AccountId;
pub use basket::{Basket, BasketEntry, PoolId};
pub use call_graph::{
    Action, CallGraph, CallNode, FunctionCall, NodeId, OutboundCall, Pending, PromiseResult,
};
pub use context::{CallContext, CallOutcome};
pub use error::{ContractError, ContractResult};
pub use form::{CreateIndexForm, DeployIndexArgs};
pub use ledger::FungibleLedger;
pub use metadata::FungibleTokenMetadata;
pub use report::{ChainReport, ExecutedCall};
pub use transaction::{Transaction, TransactionEnvelope, WalletAction};
pub use units::{Balance, Gas, U128};
