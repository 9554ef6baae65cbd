//! Call Scheduler - Call Graph Execution
//!
//! Runs a `CallGraph` against a `CallDispatcher` with the platform's
//! composition rules:
//! - "and": nodes whose dependencies are all complete run concurrently
//! - "then": a node starts only after every dependency finished, and
//!   receives their results in declaration order, failed ones included
//! - batched actions on one node run in order; the first failure fails
//!   the node and skips the rest
//! - a call that returns a graph resolves to that graph's tail result
//!
//! There is no timeout, retry or cancellation. Every node that can run
//! does run; failures are recorded in the `ChainReport`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
  AccountId, Action, CallContext, CallGraph, CallNode, CallOutcome, ChainReport, ExecutedCall,
  NodeId, OutboundCall, PromiseResult,
};
use crate::ports::executor::CallDispatcher;

/// Nested graphs deeper than this are treated as runaway recursion.
const MAX_DEPTH: usize = 32;

/// Shared trace of one transaction.
#[derive(Default)]
struct Trace {
  /// Logical clock, advanced on every node start and finish.
  clock: AtomicU64,
  /// Finished nodes, in completion order.
  calls: Mutex<Vec<ExecutedCall>>,
}

impl Trace {
  fn tick(&self) -> u64 {
    self.clock.fetch_add(1, Ordering::SeqCst)
  }

  fn record(&self, call: ExecutedCall) {
    if let Ok(mut calls) = self.calls.lock() {
      calls.push(call);
    }
  }

  fn into_calls(self) -> Vec<ExecutedCall> {
    self.calls.into_inner().unwrap_or_default()
  }
}

/// Executes call graphs over a dispatcher.
pub struct CallScheduler<D: CallDispatcher> {
  /// Receipt execution backend.
  dispatcher: Arc<D>,
}

impl<D: CallDispatcher> CallScheduler<D> {
  /// Create a new scheduler.
  pub fn new(dispatcher: Arc<D>) -> Self {
    Self { dispatcher }
  }

  /// Sign and execute a transaction: `actions` on `receiver`, then
  /// everything they schedule.
  ///
  /// # Errors
  /// Never fails on contract errors (those land in the report); returns
  /// error only for an empty transaction.
  #[instrument(skip_all, fields(signer = %signer, receiver = %receiver))]
  pub async fn submit(
    &self,
    signer: &AccountId,
    receiver: &AccountId,
    actions: Vec<Action>,
  ) -> Result<ChainReport> {
    anyhow::ensure!(!actions.is_empty(), "Transaction to {receiver} has no actions");

    let mut call = OutboundCall::new(receiver.clone());
    for action in actions {
      call = match action {
        Action::FunctionCall(fc) => call.function_call(fc),
        Action::Transfer { deposit } => call.transfer(deposit),
        Action::CreateAccount => call.create_account(),
        Action::DeployContract { code } => call.deploy_contract(code),
      };
    }
    let mut graph = CallGraph::new();
    graph.spawn(call);

    self.execute(signer, signer, &graph).await
  }

  /// Execute `graph` as if scheduled by `predecessor` on behalf of `signer`.
  ///
  /// # Errors
  /// Returns error if the graph is structurally invalid.
  pub async fn execute(
    &self,
    signer: &AccountId,
    predecessor: &AccountId,
    graph: &CallGraph,
  ) -> Result<ChainReport> {
    graph.validate()?;
    let trace = Trace::default();
    let results = self
      .run_graph(graph, predecessor.clone(), signer.clone(), Vec::new(), &trace)
      .await;
    let outcome = tail_result(graph, &results);

    let report = ChainReport {
      calls: trace.into_calls(),
      outcome,
    };
    info!(
      calls = report.calls.len(),
      failures = report.failures().len(),
      success = report.is_success(),
      "Call graph executed"
    );
    Ok(report)
  }

  /// Run every node of `graph`, wave by wave. Returns per-node results.
  fn run_graph<'a>(
    &'a self,
    graph: &'a CallGraph,
    predecessor: AccountId,
    signer: AccountId,
    scope: Vec<NodeId>,
    trace: &'a Trace,
  ) -> BoxFuture<'a, Vec<PromiseResult>> {
    async move {
      let mut results: Vec<Option<PromiseResult>> = vec![None; graph.len()];
      let mut started = vec![false; graph.len()];

      loop {
        let ready: Vec<&CallNode> = graph
          .nodes()
          .iter()
          .filter(|n| !started[n.id] && n.deps.iter().all(|d| results[*d].is_some()))
          .collect();
        if ready.is_empty() {
          break;
        }

        let wave = ready.iter().map(|node| {
          started[node.id] = true;
          let deps = node
            .deps
            .iter()
            .map(|d| results[*d].clone().unwrap_or(PromiseResult::Failed))
            .collect();
          let mut path = scope.clone();
          path.push(node.id);
          self.run_node(node, deps, predecessor.clone(), signer.clone(), path, trace)
        });
        let outcomes = join_all(wave.collect::<Vec<_>>()).await;

        for (node, outcome) in ready.iter().zip(outcomes) {
          results[node.id] = Some(outcome);
        }
      }

      results
        .into_iter()
        .map(|r| r.unwrap_or(PromiseResult::Failed))
        .collect()
    }
    .boxed()
  }

  /// Run the actions of one receipt in order.
  async fn run_node(
    &self,
    node: &CallNode,
    promise_results: Vec<PromiseResult>,
    predecessor: AccountId,
    signer: AccountId,
    scope: Vec<NodeId>,
    trace: &Trace,
  ) -> PromiseResult {
    let started = trace.tick();
    let mut result = PromiseResult::Successful(Vec::new());
    let mut error = None;

    for action in &node.actions {
      let ctx = CallContext {
        current_account: node.receiver.clone(),
        predecessor: predecessor.clone(),
        signer: signer.clone(),
        attached_deposit: action.deposit(),
        prepaid_gas: action.gas(),
        promise_results: promise_results.clone(),
      };

      match self.dispatcher.dispatch(ctx, action.clone()).await {
        Ok(CallOutcome::Value(bytes)) => result = PromiseResult::Successful(bytes),
        Ok(CallOutcome::Promise(graph)) => {
          result = self
            .run_returned(&graph, &node.receiver, &signer, &scope, trace)
            .await;
        }
        Ok(CallOutcome::Detached { value, graph }) => {
          self
            .run_returned(&graph, &node.receiver, &signer, &scope, trace)
            .await;
          result = PromiseResult::Successful(value);
        }
        Err(e) => {
          warn!(
            receiver = %node.receiver,
            action = action.label(),
            error = %e,
            "Receipt failed"
          );
          error = Some(format!("{}: {e:#}", action.label()));
          result = PromiseResult::Failed;
          break;
        }
      }
    }

    let finished = trace.tick();
    debug!(node = node.id, label = %node.label(), ok = result.is_success(), "Receipt done");
    trace.record(ExecutedCall {
      scope,
      receiver: node.receiver.clone(),
      predecessor,
      actions: node.actions.iter().map(|a| a.label().to_string()).collect(),
      deposit: node.deposit(),
      gas: node.gas(),
      started,
      finished,
      success: error.is_none(),
      error,
    });
    result
  }

  /// Run a graph returned by a call on `owner`; resolve to its tail.
  async fn run_returned(
    &self,
    graph: &CallGraph,
    owner: &AccountId,
    signer: &AccountId,
    scope: &[NodeId],
    trace: &Trace,
  ) -> PromiseResult {
    if scope.len() >= MAX_DEPTH {
      warn!(depth = scope.len(), "Call graph nesting too deep");
      return PromiseResult::Failed;
    }
    if let Err(e) = graph.validate() {
      warn!(owner = %owner, error = %e, "Returned call graph is invalid");
      return PromiseResult::Failed;
    }
    let results = self
      .run_graph(graph, owner.clone(), signer.clone(), scope.to_vec(), trace)
      .await;
    tail_result(graph, &results)
  }
}

fn tail_result(graph: &CallGraph, results: &[PromiseResult]) -> PromiseResult {
  graph
    .tail()
    .and_then(|t| results.get(t).cloned())
    .unwrap_or(PromiseResult::Successful(Vec::new()))
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;

  use super::*;
  use crate::domain::units::FIVE_TGAS;
  use crate::domain::{FunctionCall, Pending};

  fn acc(s: &str) -> AccountId {
    s.parse().unwrap()
  }

  fn call(receiver: &str, method: &str) -> OutboundCall {
    OutboundCall::new(acc(receiver))
      .function_call(FunctionCall::json(method, &serde_json::json!({}), 0, FIVE_TGAS).unwrap())
  }

  /// Echoes the number of results it saw; `fail` always errors.
  struct Echo;

  #[async_trait]
  impl CallDispatcher for Echo {
    async fn dispatch(&self, ctx: CallContext, action: Action) -> Result<CallOutcome> {
      match action.label() {
        "fail" => anyhow::bail!("boom"),
        "count_ok" => {
          let ok = ctx.promise_results.iter().filter(|r| r.is_success()).count();
          Ok(CallOutcome::json(&ok))
        }
        "nested" => {
          let mut graph = CallGraph::new();
          let a = graph.spawn(call("x.testnet", "one"));
          graph.then(&a, call("y.testnet", "count_ok"));
          Ok(CallOutcome::Promise(graph))
        }
        _ => Ok(CallOutcome::json(&ctx.promise_results.len())),
      }
    }
  }

  #[tokio::test]
  async fn test_then_sees_failed_dependencies() {
    let scheduler = CallScheduler::new(Arc::new(Echo));
    let mut graph = CallGraph::new();
    let a = graph.spawn(call("a.testnet", "one"));
    let b = graph.spawn(call("b.testnet", "fail"));
    graph.then(&a.and(b), call("c.testnet", "count_ok"));

    let report = scheduler
      .execute(&acc("alice.testnet"), &acc("index.testnet"), &graph)
      .await
      .unwrap();
    assert_eq!(report.calls.len(), 3);
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.outcome_json::<usize>(), Some(1));
  }

  #[tokio::test]
  async fn test_dependencies_finish_first() {
    let scheduler = CallScheduler::new(Arc::new(Echo));
    let mut graph = CallGraph::new();
    let root = graph.spawn(call("a.testnet", "one"));
    let mut joined = Pending::empty();
    for r in ["b.testnet", "c.testnet", "d.testnet"] {
      joined = joined.and(graph.then(&root, call(r, "one")));
    }
    graph.then(&joined, call("e.testnet", "one"));

    let report = scheduler
      .execute(&acc("alice.testnet"), &acc("index.testnet"), &graph)
      .await
      .unwrap();
    for executed in &report.calls {
      let node = graph.node(executed.scope[0]).unwrap();
      for dep in &node.deps {
        let dep_call = report.calls.iter().find(|c| c.scope == vec![*dep]).unwrap();
        assert!(dep_call.finished < executed.started);
      }
    }
    assert_eq!(report.outcome_json::<usize>(), Some(3));
  }

  #[tokio::test]
  async fn test_batch_stops_at_first_failure() {
    let scheduler = CallScheduler::new(Arc::new(Echo));
    let actions = call("a.testnet", "one")
      .function_call(FunctionCall::json("fail", &serde_json::json!({}), 0, FIVE_TGAS).unwrap())
      .function_call(FunctionCall::json("one", &serde_json::json!({}), 0, FIVE_TGAS).unwrap())
      .actions()
      .to_vec();
    let report = scheduler
      .submit(&acc("alice.testnet"), &acc("a.testnet"), actions)
      .await
      .unwrap();
    assert!(!report.is_success());
    assert!(report.calls[0].error.as_deref().unwrap_or_default().starts_with("fail"));
  }

  #[tokio::test]
  async fn test_returned_graph_resolves_to_tail() {
    let scheduler = CallScheduler::new(Arc::new(Echo));
    let actions = call("a.testnet", "nested").actions().to_vec();
    let report = scheduler
      .submit(&acc("alice.testnet"), &acc("a.testnet"), actions)
      .await
      .unwrap();
    assert_eq!(report.calls.len(), 3);
    assert_eq!(report.outcome_json::<usize>(), Some(1));
    let nested = report.find("count_ok").unwrap();
    assert_eq!(nested.scope, vec![0, 1]);
    assert_eq!(nested.predecessor, acc("a.testnet"));
  }

  #[tokio::test]
  async fn test_empty_transaction_rejected() {
    let scheduler = CallScheduler::new(Arc::new(Echo));
    assert!(scheduler
      .submit(&acc("alice.testnet"), &acc("a.testnet"), Vec::new())
      .await
      .is_err());
  }
}
