//! Execution trace of a call graph.

use serde::Serialize;

use super::account::AccountId;
use super::call_graph::{NodeId, PromiseResult};
use super::units::{Balance, Gas};

/// One executed receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutedCall {
    /// Path of node ids from the top-level graph down to this node.
    pub scope: Vec<NodeId>,
    pub receiver: AccountId,
    pub predecessor: AccountId,
    /// Labels of the node's actions, in batch order.
    pub actions: Vec<String>,
    pub deposit: Balance,
    pub gas: Gas,
    /// Tick at which the node was started.
    pub started: u64,
    /// Tick at which the node finished.
    pub finished: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutedCall {
    /// Whether any action of the node is a call to `method`.
    pub fn calls(&self, method: &str) -> bool {
        self.actions.iter().any(|a| a == method)
    }

    pub fn depth(&self) -> usize {
        self.scope.len().saturating_sub(1)
    }
}

/// Everything that ran for one submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub calls: Vec<ExecutedCall>,
    /// Result of the transaction's own receipt.
    #[serde(skip)]
    pub outcome: PromiseResult,
}

impl ChainReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn failures(&self) -> Vec<&ExecutedCall> {
        self.calls.iter().filter(|c| !c.success).collect()
    }

    /// Calls ordered by completion.
    pub fn completion_order(&self) -> Vec<&ExecutedCall> {
        let mut calls: Vec<&ExecutedCall> = self.calls.iter().collect();
        calls.sort_by_key(|c| (c.finished, c.started));
        calls
    }

    /// First call that invoked `method`.
    pub fn find(&self, method: &str) -> Option<&ExecutedCall> {
        self.calls.iter().find(|c| c.calls(method))
    }

    /// Every call that invoked `method`.
    pub fn find_all(&self, method: &str) -> Vec<&ExecutedCall> {
        self.calls.iter().filter(|c| c.calls(method)).collect()
    }

    /// Decode the transaction result as JSON.
    pub fn outcome_json<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        match &self.outcome {
            PromiseResult::Successful(bytes) => serde_json::from_slice(bytes).ok(),
            PromiseResult::Failed => None,
        }
    }
}
