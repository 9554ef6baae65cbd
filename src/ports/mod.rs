//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `ViewClient`: Read-only contract queries (JSON-RPC or sandbox)
//! - `CallDispatcher`: Receipt execution for the call scheduler
//! - `WalletSubmitter`: Hand-off of signable transaction envelopes

pub mod executor;
pub mod view;
pub mod wallet;

pub use executor::CallDispatcher;
pub use view::ViewClient;
pub use wallet::WalletSubmitter;
