//! Use Cases Layer - Application Business Logic
//!
//! Contract logic runs against the domain model and emits call graphs;
//! the scheduler executes those graphs through the dispatcher port. The
//! read and write sides of the frontend sit on the view and wallet ports.
//!
//! Use cases:
//! - `IndexContract`: basket, swap/buy/redeem chains and their callbacks
//! - `IndexManager`: index deployment registry
//! - `CallScheduler`: wave-by-wave execution of call graphs
//! - `Explorer`: index listing, prices, portfolio, pool discovery
//! - `TransactionBuilder`: wallet transactions for user actions

pub mod explorer;
pub mod index_contract;
pub mod manager;
pub mod scheduler;
pub mod tx_builder;
