//! Node/flow orchestration engine.
//!
//! A [`Node`] is a unit of work with three lifecycle phases run in
//! strict sequence: `prepare` reads the shared context and computes an
//! input value, `execute` does the actual work (the only phase allowed
//! to call external services), and `postprocess` writes results back
//! into the context and names the outgoing edge to follow.
//!
//! A [`Flow`] connects named nodes with labeled edges held in an
//! explicit adjacency map `(node, label) -> node`. Execution starts at
//! the designated start node and follows the edge matching each
//! postprocess label; when no edge matches, the flow terminates
//! successfully. Edges may point backward, so a node that returns e.g.
//! `"retry"` can drive a loop, bounded or not, entirely from its
//! postprocess logic.
//!
//! Any fault raised during `execute` (or either sync phase) aborts the
//! whole run and propagates to the caller.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Label of the edge followed when a node has nothing special to say.
pub const DEFAULT_ACTION: &str = "default";

/// A processing node over a shared context of type `C`.
///
/// By convention each node writes only the context keys it introduces
/// and reads keys written by earlier nodes; only one node ever runs at
/// a time, so no further coordination is needed.
#[async_trait]
pub trait Node<C: Send>: Send + Sync {
    /// Pure read of the shared context; computes the execute input.
    fn prepare(&self, ctx: &C) -> Result<Value>;

    /// Perform the node's work. May call external services.
    async fn execute(&self, input: Value) -> Result<Value>;

    /// Write results into the context and name the edge to follow.
    fn postprocess(&self, ctx: &mut C, input: Value, result: Value) -> Result<String>;
}

/// A directed graph of nodes with labeled edges.
pub struct Flow<C: Send> {
    start: String,
    nodes: HashMap<String, Box<dyn Node<C>>>,
    edges: HashMap<(String, String), String>,
}

impl<C: Send> Flow<C> {
    pub fn new(start: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            nodes: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: impl Node<C> + 'static) {
        self.nodes.insert(name.into(), Box::new(node));
    }

    /// Connect `from` to `to` along the default edge.
    pub fn chain(&mut self, from: &str, to: &str) {
        self.branch(from, DEFAULT_ACTION, to);
    }

    /// Connect `from` to `to` along the edge named `label`.
    pub fn branch(&mut self, from: &str, label: &str, to: &str) {
        self.edges
            .insert((from.to_string(), label.to_string()), to.to_string());
    }

    /// Run the flow to completion over `ctx`.
    pub async fn run(&self, ctx: &mut C) -> Result<()> {
        let mut current = self.start.clone();

        loop {
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| anyhow!("flow references unknown node: {}", current))?;

            let input = node.prepare(ctx)?;
            let result = node.execute(input.clone()).await?;
            let action = node.postprocess(ctx, input, result)?;

            match self.edges.get(&(current.clone(), action.clone())) {
                Some(next) => current = next.clone(),
                None => break,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TraceContext {
        visits: Vec<String>,
    }

    /// Records its name on every visit and follows the default edge.
    struct StepNode {
        name: &'static str,
    }

    #[async_trait]
    impl Node<TraceContext> for StepNode {
        fn prepare(&self, _ctx: &TraceContext) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn execute(&self, _input: Value) -> Result<Value> {
            Ok(Value::Null)
        }

        fn postprocess(
            &self,
            ctx: &mut TraceContext,
            _input: Value,
            _result: Value,
        ) -> Result<String> {
            ctx.visits.push(self.name.to_string());
            Ok(DEFAULT_ACTION.to_string())
        }
    }

    /// Returns `"retry"` a fixed number of times, then default.
    struct RetryNode {
        name: &'static str,
        retries_left: AtomicUsize,
    }

    #[async_trait]
    impl Node<TraceContext> for RetryNode {
        fn prepare(&self, _ctx: &TraceContext) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn execute(&self, _input: Value) -> Result<Value> {
            Ok(Value::Null)
        }

        fn postprocess(
            &self,
            ctx: &mut TraceContext,
            _input: Value,
            _result: Value,
        ) -> Result<String> {
            ctx.visits.push(self.name.to_string());
            let remaining = self.retries_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.retries_left.store(remaining - 1, Ordering::SeqCst);
                Ok("retry".to_string())
            } else {
                Ok(DEFAULT_ACTION.to_string())
            }
        }
    }

    struct FailingNode;

    #[async_trait]
    impl Node<TraceContext> for FailingNode {
        fn prepare(&self, _ctx: &TraceContext) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn execute(&self, _input: Value) -> Result<Value> {
            anyhow::bail!("service unavailable")
        }

        fn postprocess(
            &self,
            _ctx: &mut TraceContext,
            _input: Value,
            _result: Value,
        ) -> Result<String> {
            Ok(DEFAULT_ACTION.to_string())
        }
    }

    #[tokio::test]
    async fn test_default_chain_runs_in_order_then_stops() {
        let mut flow = Flow::new("a");
        flow.add_node("a", StepNode { name: "a" });
        flow.add_node("b", StepNode { name: "b" });
        flow.chain("a", "b");
        // No edge out of b: the flow stops after it.

        let mut ctx = TraceContext::default();
        flow.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.visits, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_back_edge_retries_once() {
        let mut flow = Flow::new("a");
        flow.add_node("a", StepNode { name: "a" });
        flow.add_node(
            "b",
            RetryNode {
                name: "b",
                retries_left: AtomicUsize::new(1),
            },
        );
        flow.chain("a", "b");
        flow.branch("b", "retry", "a");

        let mut ctx = TraceContext::default();
        flow.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.visits, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_unmatched_label_terminates() {
        let mut flow = Flow::new("a");
        flow.add_node(
            "a",
            RetryNode {
                name: "a",
                retries_left: AtomicUsize::new(1),
            },
        );
        // "retry" has no edge: the flow terminates on the first visit.

        let mut ctx = TraceContext::default();
        flow.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.visits, vec!["a"]);
    }

    #[tokio::test]
    async fn test_execute_fault_aborts_run() {
        let mut flow = Flow::new("a");
        flow.add_node("a", StepNode { name: "a" });
        flow.add_node("fail", FailingNode);
        flow.chain("a", "fail");

        let mut ctx = TraceContext::default();
        let err = flow.run(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("service unavailable"));
        // a ran; the failing node contributed nothing.
        assert_eq!(ctx.visits, vec!["a"]);
    }

    #[tokio::test]
    async fn test_missing_start_node_is_an_error() {
        let flow: Flow<TraceContext> = Flow::new("ghost");
        let mut ctx = TraceContext::default();
        let err = flow.run(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("unknown node"));
    }
}
