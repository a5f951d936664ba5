use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Run-scoped map from node id to the output that node produced.
///
/// Created fresh for every run and owned by the scheduler. Entries are only
/// ever inserted; a node re-executed inside a cycle replaces its own entry.
/// Nothing is removed while the run is live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    outputs: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the output stored for a node.
    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.outputs.get(node_id)
    }

    /// Record a node's output. Returns the previous value when the node had
    /// already produced one in this run.
    pub fn record(&mut self, node_id: impl Into<String>, output: Value) -> Option<Value> {
        self.outputs.insert(node_id.into(), output)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// The whole context as a JSON object keyed by node id (bound to
    /// `context` inside script nodes).
    pub fn as_json(&self) -> Value {
        Value::Object(
            self.outputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// Render a value the way it is spliced into prompts and concatenated
/// inputs: strings verbatim, everything else as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
