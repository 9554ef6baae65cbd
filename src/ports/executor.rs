//! Call Dispatcher Port - Receipt Execution Interface
//!
//! The scheduler walks a `CallGraph` and hands every action of every
//! ready node to a dispatcher. The dispatcher owns the accounts and
//! contracts the graph talks to; it runs one action and reports what
//! the contract returned.
//!
//! Key design decisions:
//! - One action per dispatch; batching and ordering stay in the scheduler
//! - A returned `CallOutcome::Promise` is executed by the scheduler, not here
//! - `Err` means the action failed (a panic, in platform terms)

use async_trait::async_trait;

use crate::domain::{Action, CallContext, CallOutcome};

/// Trait for receipt execution backends.
#[async_trait]
pub trait CallDispatcher: Send + Sync + 'static {
  /// Execute `action` on `ctx.current_account`.
  ///
  /// Attached deposits move from `ctx.predecessor` to the receiver as
  /// part of the action and are refunded if it fails.
  ///
  /// # Errors
  /// Returns error if the action fails. The error message ends up in the
  /// chain report; the node is marked failed.
  async fn dispatch(&self, ctx: CallContext, action: Action) -> anyhow::Result<CallOutcome>;
}
