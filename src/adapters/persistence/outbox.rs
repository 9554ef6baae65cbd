//! Envelope Outbox - Append-only JSONL Wallet Queue
//!
//! Persists every submitted transaction envelope to daily JSONL files in
//! the format `outbox/YYYY-MM-DD.jsonl`. A browser wallet (or any signer)
//! picks envelopes up from there; each line is a complete
//! wallet-selector `signAndSendTransactions` payload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::TransactionEnvelope;
use crate::ports::wallet::WalletSubmitter;

/// Append-only JSONL envelope outbox with daily file rotation.
pub struct JsonlOutbox {
    /// Directory holding the daily files.
    dir: PathBuf,
    /// Optional metrics sink.
    metrics: Option<Arc<MetricsRegistry>>,
}

impl JsonlOutbox {
    /// Create the outbox under `data_dir/outbox`.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir).join("outbox");
        fs::create_dir_all(&dir)
            .await
            .context("Failed to create outbox directory")?;
        Ok(Self { dir, metrics: None })
    }

    /// Attach a metrics registry.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append an envelope to the file of its creation day.
    #[instrument(skip(self, envelope), fields(envelope = %envelope.id))]
    pub async fn append(&self, envelope: &TransactionEnvelope) -> Result<()> {
        let date = envelope.created_at.format("%Y-%m-%d").to_string();
        let path = self.dir.join(format!("{date}.jsonl"));

        let mut json = serde_json::to_string(envelope).context("Failed to serialize envelope")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open outbox file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write envelope")?;
        file.flush().await.context("Failed to flush outbox")?;

        if let Some(m) = &self.metrics {
            m.envelopes_submitted.inc();
        }
        Ok(())
    }

    /// Load every envelope, oldest first.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<TransactionEnvelope>> {
        let mut envelopes = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                let content = fs::read_to_string(&path).await?;
                for line in content.lines().filter(|l| !l.trim().is_empty()) {
                    match serde_json::from_str::<TransactionEnvelope>(line) {
                        Ok(envelope) => envelopes.push(envelope),
                        Err(e) => {
                            warn!(file = %path.display(), error = %e, "Skipping malformed envelope");
                        }
                    }
                }
            }
        }

        envelopes.sort_by_key(|e| e.created_at);
        info!(count = envelopes.len(), "Loaded outbox envelopes");
        Ok(envelopes)
    }

    /// Check if the outbox directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let probe = self.dir.join(".health_check");
        let result = fs::write(&probe, b"ok").await;
        let _ = fs::remove_file(&probe).await;
        result.is_ok()
    }
}

#[async_trait]
impl WalletSubmitter for JsonlOutbox {
    async fn submit(&self, envelope: &TransactionEnvelope) -> Result<()> {
        self.append(envelope).await
    }
}
