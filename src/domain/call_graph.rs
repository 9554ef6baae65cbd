//! Cross-contract call graph.
//!
//! The platform only lets a contract *describe* outbound calls: parallel
//! independence ("and") and sequential dependency ("then"). This module
//! models that description as an explicit DAG. Nodes are receipts: one
//! receiver plus an ordered batch of actions. Edges are data
//! dependencies: a node runs only after every node it depends on has
//! finished, and it receives their results in declaration order.
//!
//! Nodes are appended in topological order by construction (`then` can
//! only reference nodes that already exist), so the graph is acyclic
//! without any extra bookkeeping.
//!
//! ```text
//!   wrap ──┬── swap A ──┐
//!          └── swap B ──┴── withdraw_from_exchange
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use super::account::AccountId;
use super::error::{ContractError, ContractResult};
use super::units::{Balance, Gas};

/// Index of a node inside its graph.
pub type NodeId = usize;

/// Outcome of one finished receipt, as seen by whatever depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromiseResult {
    /// Return value of the last action (JSON bytes, possibly empty).
    Successful(Vec<u8>),
    Failed,
}

impl PromiseResult {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Successful(_))
    }

    /// Encode a JSON value as a successful result.
    pub fn json<T: Serialize>(value: &T) -> Self {
        Self::Successful(serde_json::to_vec(value).unwrap_or_default())
    }
}

/// Contract code attached to a deploy action. Shared, never copied per node.
#[derive(Clone, PartialEq, Eq)]
pub struct ContractCode(pub Arc<Vec<u8>>);

impl fmt::Debug for ContractCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractCode({} bytes)", self.0.len())
    }
}

impl Serialize for ContractCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0.len() as u64)
    }
}

/// A function call action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionCall {
    pub method_name: String,
    /// JSON-encoded arguments.
    #[serde(serialize_with = "serialize_args")]
    pub args: Vec<u8>,
    pub deposit: Balance,
    pub gas: Gas,
}

fn serialize_args<S: Serializer>(args: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    match serde_json::from_slice::<serde_json::Value>(args) {
        Ok(value) => value.serialize(serializer),
        Err(_) => serializer.serialize_str(&String::from_utf8_lossy(args)),
    }
}

impl FunctionCall {
    /// Build a call whose arguments are `args` encoded as JSON.
    pub fn json<T: Serialize>(
        method_name: &str,
        args: &T,
        deposit: Balance,
        gas: Gas,
    ) -> ContractResult<Self> {
        let args = serde_json::to_vec(args).map_err(|e| ContractError::InvalidArgs {
            method: method_name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            method_name: method_name.to_string(),
            args,
            deposit,
            gas,
        })
    }

    /// Decode the JSON arguments into `T`.
    pub fn args_json<T: DeserializeOwned>(&self) -> ContractResult<T> {
        let raw: &[u8] = if self.args.is_empty() { b"{}" } else { &self.args };
        serde_json::from_slice(raw).map_err(|e| ContractError::InvalidArgs {
            method: self.method_name.clone(),
            reason: e.to_string(),
        })
    }
}

/// A single action inside a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    CreateAccount,
    Transfer { deposit: Balance },
    DeployContract { code: ContractCode },
    FunctionCall(FunctionCall),
}

impl Action {
    pub const fn gas(&self) -> Gas {
        match self {
            Self::FunctionCall(fc) => fc.gas,
            _ => Gas(0),
        }
    }

    pub const fn deposit(&self) -> Balance {
        match self {
            Self::FunctionCall(fc) => fc.deposit,
            Self::Transfer { deposit } => *deposit,
            _ => 0,
        }
    }

    /// Short label for logs: method name or action kind.
    pub fn label(&self) -> &str {
        match self {
            Self::CreateAccount => "create_account",
            Self::Transfer { .. } => "transfer",
            Self::DeployContract { .. } => "deploy_contract",
            Self::FunctionCall(fc) => &fc.method_name,
        }
    }
}

/// Builder for one receipt: a receiver and its ordered actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCall {
    receiver: AccountId,
    actions: Vec<Action>,
}

impl OutboundCall {
    pub const fn new(receiver: AccountId) -> Self {
        Self {
            receiver,
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn function_call(mut self, call: FunctionCall) -> Self {
        self.actions.push(Action::FunctionCall(call));
        self
    }

    #[must_use]
    pub fn transfer(mut self, deposit: Balance) -> Self {
        self.actions.push(Action::Transfer { deposit });
        self
    }

    #[must_use]
    pub fn create_account(mut self) -> Self {
        self.actions.push(Action::CreateAccount);
        self
    }

    #[must_use]
    pub fn deploy_contract(mut self, code: ContractCode) -> Self {
        self.actions.push(Action::DeployContract { code });
        self
    }

    pub const fn receiver(&self) -> &AccountId {
        &self.receiver
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

/// A receipt placed in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallNode {
    pub id: NodeId,
    pub receiver: AccountId,
    pub actions: Vec<Action>,
    /// Nodes whose results this one waits for, in delivery order.
    pub deps: Vec<NodeId>,
}

impl CallNode {
    pub fn gas(&self) -> Gas {
        self.actions.iter().map(Action::gas).sum()
    }

    pub fn deposit(&self) -> Balance {
        self.actions.iter().map(Action::deposit).sum()
    }

    /// `receiver.method` of the first function call, or the first action kind.
    pub fn label(&self) -> String {
        let first = self.actions.first().map_or("noop", Action::label);
        format!("{}.{first}", self.receiver)
    }
}

/// Handle to a set of nodes that a later `then` can wait on.
///
/// `a.and(b)` joins two handles; a node chained after the joined handle
/// depends on every node in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pending {
    nodes: Vec<NodeId>,
}

impl Pending {
    pub const fn empty() -> Self {
        Self { nodes: Vec::new() }
    }

    #[must_use]
    pub fn and(mut self, other: Self) -> Self {
        for id in other.nodes {
            if !self.nodes.contains(&id) {
                self.nodes.push(id);
            }
        }
        self
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Directed acyclic graph of outbound calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallGraph {
    nodes: Vec<CallNode>,
}

impl CallGraph {
    pub const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a call with no dependencies.
    pub fn spawn(&mut self, call: OutboundCall) -> Pending {
        self.push(call, Vec::new())
    }

    /// Add a call that runs after everything in `after` has finished.
    pub fn then(&mut self, after: &Pending, call: OutboundCall) -> Pending {
        self.push(call, after.nodes.clone())
    }

    fn push(&mut self, call: OutboundCall, deps: Vec<NodeId>) -> Pending {
        let id = self.nodes.len();
        debug_assert!(deps.iter().all(|d| *d < id));
        self.nodes.push(CallNode {
            id,
            receiver: call.receiver,
            actions: call.actions,
            deps,
        });
        Pending { nodes: vec![id] }
    }

    pub fn nodes(&self) -> &[CallNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&CallNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node whose result is the result of the whole graph.
    pub fn tail(&self) -> Option<NodeId> {
        self.nodes.last().map(|n| n.id)
    }

    /// Sum of the gas attached to every action in the graph.
    pub fn total_gas(&self) -> Gas {
        self.nodes.iter().map(CallNode::gas).sum()
    }

    pub fn total_deposit(&self) -> Balance {
        self.nodes.iter().map(CallNode::deposit).sum()
    }

    /// Nodes that directly depend on `id`.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.deps.contains(&id))
            .map(|n| n.id)
            .collect()
    }

    /// Reject a graph whose attached gas exceeds `budget`.
    pub fn check_gas(&self, stage: &'static str, budget: Gas) -> ContractResult<()> {
        let needed = self.total_gas();
        if needed > budget {
            return Err(ContractError::GasBudgetExceeded {
                stage,
                needed,
                budget,
            });
        }
        Ok(())
    }

    /// Structural checks: dependencies point backwards, no empty receipts.
    pub fn validate(&self) -> ContractResult<()> {
        for (pos, node) in self.nodes.iter().enumerate() {
            if node.id != pos {
                return Err(ContractError::Graph(format!("node {pos} carries id {}", node.id)));
            }
            if node.actions.is_empty() {
                return Err(ContractError::Graph(format!("node {pos} has no actions")));
            }
            if let Some(bad) = node.deps.iter().find(|d| **d >= pos) {
                return Err(ContractError::Graph(format!(
                    "node {pos} depends on later node {bad}"
                )));
            }
        }
        Ok(())
    }

    /// Topological layers: every node in layer `k` depends only on nodes in
    /// layers `< k`. Nodes of one layer may run concurrently.
    pub fn levels(&self) -> Vec<Vec<NodeId>> {
        let mut depth = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            depth[node.id] = node
                .deps
                .iter()
                .map(|d| depth[*d] + 1)
                .max()
                .unwrap_or(0);
        }
        let layers = depth.iter().max().map_or(0, |m| m + 1);
        let mut out = vec![Vec::new(); layers];
        for (id, d) in depth.into_iter().enumerate() {
            out[d].push(id);
        }
        out
    }

    /// One line per node, for logs and the CLI.
    pub fn describe(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|n| {
                let methods: Vec<&str> = n.actions.iter().map(Action::label).collect();
                let after = if n.deps.is_empty() {
                    String::new()
                } else {
                    let deps: Vec<String> = n.deps.iter().map(|d| format!("#{d}")).collect();
                    format!(" after {}", deps.join(","))
                };
                format!("#{} {} [{}]{after}", n.id, n.receiver, methods.join(" → "))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::units::{FIVE_TGAS, ONE_YOCTO, TWENTY_TGAS};

    fn acc(s: &str) -> AccountId {
        s.parse().unwrap()
    }

    fn call(receiver: &str, method: &str, gas: Gas) -> OutboundCall {
        OutboundCall::new(acc(receiver))
            .function_call(FunctionCall::json(method, &serde_json::json!({}), ONE_YOCTO, gas).unwrap())
    }

    #[test]
    fn test_and_then_builds_join() {
        let mut g = CallGraph::new();
        let root = g.spawn(call("wrap.testnet", "near_deposit", FIVE_TGAS));
        let a = g.then(&root, call("ref.testnet", "swap", TWENTY_TGAS));
        let b = g.then(&root, call("ref.testnet", "swap", TWENTY_TGAS));
        let joined = a.and(b);
        let cb = g.then(&joined, call("index.testnet", "withdraw_from_exchange", TWENTY_TGAS));

        assert_eq!(g.len(), 4);
        assert_eq!(g.node(3).unwrap().deps, vec![1, 2]);
        assert_eq!(cb.nodes(), &[3]);
        assert_eq!(g.levels(), vec![vec![0], vec![1, 2], vec![3]]);
        assert_eq!(g.dependents(0), vec![1, 2]);
        assert_eq!(g.tail(), Some(3));
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_and_deduplicates() {
        let mut g = CallGraph::new();
        let a = g.spawn(call("a.testnet", "x", FIVE_TGAS));
        let joined = a.clone().and(a);
        assert_eq!(joined.nodes(), &[0]);
    }

    #[test]
    fn test_gas_accounting() {
        let mut g = CallGraph::new();
        let root = g.spawn(call("a.testnet", "x", FIVE_TGAS).function_call(
            FunctionCall::json("y", &serde_json::json!({}), 0, TWENTY_TGAS).unwrap(),
        ));
        g.then(&root, call("b.testnet", "z", TWENTY_TGAS));
        assert_eq!(g.total_gas(), Gas::from_tgas(45));
        assert_eq!(g.total_deposit(), 2);
        assert!(g.check_gas("test", Gas::from_tgas(45)).is_ok());
        assert!(matches!(
            g.check_gas("test", Gas::from_tgas(44)),
            Err(ContractError::GasBudgetExceeded { .. })
        ));
    }

    #[test]
    fn test_empty_receipt_rejected() {
        let mut g = CallGraph::new();
        g.spawn(OutboundCall::new(acc("a.testnet")));
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_args_roundtrip_through_json() {
        let fc = FunctionCall::json("swap", &serde_json::json!({"pool_id": 1}), 1, FIVE_TGAS).unwrap();
        let v: serde_json::Value = fc.args_json().unwrap();
        assert_eq!(v["pool_id"], 1);
    }

    #[test]
    fn test_describe() {
        let mut g = CallGraph::new();
        let root = g.spawn(call("wrap.testnet", "near_deposit", FIVE_TGAS));
        g.then(&root, call("ref.testnet", "swap", TWENTY_TGAS));
        let lines = g.describe();
        assert_eq!(lines[0], "#0 wrap.testnet [near_deposit]");
        assert_eq!(lines[1], "#1 ref.testnet [swap] after #0");
    }
}
