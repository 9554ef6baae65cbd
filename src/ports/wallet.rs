//! Wallet Submitter Port - Hand-off to a Signing Wallet
//!
//! Transactions built by the client are signed elsewhere. Submission
//! is fire-and-forget: once the wallet accepted the envelope there is
//! no receipt tracking and no retry.

use async_trait::async_trait;

use crate::domain::TransactionEnvelope;

/// Trait for wallet integrations.
#[async_trait]
pub trait WalletSubmitter: Send + Sync + 'static {
  /// Hand an envelope to the wallet.
  ///
  /// # Errors
  /// Returns error if the wallet could not take the envelope.
  async fn submit(&self, envelope: &TransactionEnvelope) -> anyhow::Result<()>;
}
