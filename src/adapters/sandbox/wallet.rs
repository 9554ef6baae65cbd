//! Wallet that signs envelopes straight into the sandbox.
//!
//! Each transaction of an envelope is executed in order through the call
//! scheduler; the resulting chain reports are kept for inspection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::Sandbox;
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::{ChainReport, TransactionEnvelope};
use crate::ports::wallet::WalletSubmitter;
use crate::usecases::scheduler::CallScheduler;

pub struct SandboxWallet {
    scheduler: CallScheduler<Sandbox>,
    /// Reports of executed transactions, oldest first.
    reports: Mutex<Vec<ChainReport>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SandboxWallet {
    pub fn new(chain: Arc<Sandbox>) -> Self {
        Self {
            scheduler: CallScheduler::new(chain),
            reports: Mutex::new(Vec::new()),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Drain the reports collected so far.
    pub async fn take_reports(&self) -> Vec<ChainReport> {
        std::mem::take(&mut *self.reports.lock().await)
    }
}

#[async_trait]
impl WalletSubmitter for SandboxWallet {
    async fn submit(&self, envelope: &TransactionEnvelope) -> anyhow::Result<()> {
        for tx in &envelope.transactions {
            let actions = tx.to_actions()?;
            let report = self
                .scheduler
                .submit(&tx.signer_id, &tx.receiver_id, actions)
                .await?;
            if report.is_success() {
                info!(envelope = %envelope.id, receiver = %tx.receiver_id, calls = report.calls.len(), "Transaction executed");
            } else {
                warn!(envelope = %envelope.id, receiver = %tx.receiver_id, failures = report.failures().len(), "Transaction executed with failures");
            }
            if let Some(m) = &self.metrics {
                m.observe_chain(&report);
            }
            self.reports.lock().await.push(report);
        }
        if let Some(m) = &self.metrics {
            m.envelopes_submitted.inc();
        }
        Ok(())
    }
}
