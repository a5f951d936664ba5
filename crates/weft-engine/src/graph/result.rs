use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use weft_core::context::ExecutionContext;
use weft_core::graph::Graph;
use weft_core::types::{LogEntry, LogLevel, NodeStatus, RunId, RunOutcome};

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    /// Node executions performed.
    pub steps: usize,
    /// Node ids in the order they started.
    pub execution_order: Vec<String>,
    pub statuses: HashMap<String, NodeStatus>,
    pub context: ExecutionContext,
    pub log: Vec<LogEntry>,
    /// Output of the last Output node to complete.
    pub final_output: Option<Value>,
    pub elapsed_ms: u64,
}

impl RunResult {
    pub fn status(&self, node_id: &str) -> NodeStatus {
        self.statuses.get(node_id).copied().unwrap_or_default()
    }

    pub fn output(&self, node_id: &str) -> Option<&Value> {
        self.context.get(node_id)
    }

    /// Ids of nodes that ended in `Error`, in execution order.
    pub fn failed_nodes(&self) -> Vec<&str> {
        let mut failed: Vec<&str> = Vec::new();
        for id in &self.execution_order {
            if self.status(id) == NodeStatus::Error && !failed.contains(&id.as_str()) {
                failed.push(id);
            }
        }
        failed
    }

    pub fn entries_at(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> {
        self.log.iter().filter(move |e| e.level == level)
    }

    /// Write `executionStatus` and `lastOutput` back into a design-time copy
    /// of the graph so an editor can render the finished run.
    pub fn annotate(&self, graph: &mut Graph) {
        for node in &mut graph.nodes {
            node.data.execution_status = Some(self.status(&node.id));
            node.data.last_output = self.context.get(&node.id).cloned();
        }
    }
}
