//! Graph model: nodes, edges, and the per-type configuration views.
//!
//! The serialized shape is owned by the visual editor and is accepted
//! verbatim (camelCase keys, `type` discriminator, free-form `data`). The
//! engine only reads a snapshot; runtime fields (`executionStatus`,
//! `lastOutput`) are written back by `RunResult::annotate`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WeftError};
use crate::types::NodeStatus;

/// Node type. Unknown type strings (legacy `task`, `tool`, ...) map to `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Trigger,
    Agent,
    Script,
    Condition,
    Request,
    Delay,
    Input,
    ImageGen,
    Output,
    #[serde(other)]
    Default,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Agent => "agent",
            Self::Script => "script",
            Self::Condition => "condition",
            Self::Request => "request",
            Self::Delay => "delay",
            Self::Input => "input",
            Self::ImageGen => "image-gen",
            Self::Output => "output",
            Self::Default => "default",
        }
    }

    pub fn all() -> &'static [NodeKind] {
        &[
            Self::Trigger,
            Self::Agent,
            Self::Script,
            Self::Condition,
            Self::Request,
            Self::Delay,
            Self::Input,
            Self::ImageGen,
            Self::Output,
            Self::Default,
        ]
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas position. Irrelevant to execution, preserved for round-tripping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Node payload: label, runtime fields, and every other editor field as config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub execution_status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<Value>,
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

/// Stale or unknown status strings from older editor builds are dropped
/// rather than failing the whole graph.
fn lenient_status<'de, D>(deserializer: D) -> std::result::Result<Option<NodeStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

/// A node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            position: Position::default(),
            data: NodeData::default(),
        }
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = Some(label.into());
        self
    }

    /// Set a config field.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.config.insert(key.into(), value.into());
        self
    }

    /// Display label: the configured label, or the node id when blank.
    pub fn label(&self) -> &str {
        match self.data.label.as_deref() {
            Some(label) if !label.trim().is_empty() => label,
            _ => &self.id,
        }
    }

    /// Read a string config field, treating blank strings as absent.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.data
            .config
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Parse the node's config into a typed view.
    pub fn config<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.data.config.clone())).map_err(|e| {
            WeftError::InvalidGraph(format!(
                "node '{}' has invalid {} config: {}",
                self.id, self.kind, e
            ))
        })
    }
}

/// A directed connection between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    /// `"true"` / `"false"` on edges leaving a condition node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Create an untagged edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("e-{}-{}", source, target),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    /// Create an edge tagged with a source handle.
    pub fn from_handle(
        source: impl Into<String>,
        handle: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let handle = handle.into();
        let mut edge = Self::new(source, target);
        edge.id = format!("{}-{}", edge.id, handle);
        edge.source_handle = Some(handle);
        edge
    }
}

/// Problems found by `Graph::validate`. None of them prevent a run.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphIssue {
    DuplicateNodeId(String),
    DanglingEdge { edge_id: String, missing: String },
    UnlabeledBranch { edge_id: String, condition: String },
    NoTrigger,
}

impl std::fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNodeId(id) => write!(f, "duplicate node id '{}'", id),
            Self::DanglingEdge { edge_id, missing } => {
                write!(f, "edge '{}' references unknown node '{}'", edge_id, missing)
            }
            Self::UnlabeledBranch { edge_id, condition } => write!(
                f,
                "edge '{}' leaves condition '{}' without a true/false handle and will never be followed",
                edge_id, condition
            ),
            Self::NoTrigger => write!(f, "graph has no trigger node"),
        }
    }
}

/// An immutable node/edge snapshot handed to the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| WeftError::InvalidGraph(e.to_string()))
    }

    /// Load a graph JSON file as saved by the editor.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Trigger nodes in declaration order.
    pub fn triggers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Trigger)
    }

    /// Edges terminating at `id`, in declaration order.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    /// Edges leaving `id`, in declaration order.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Report structural problems without rejecting the graph.
    pub fn validate(&self) -> Vec<GraphIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                issues.push(GraphIssue::DuplicateNodeId(node.id.clone()));
            }
        }

        if self.triggers().next().is_none() {
            issues.push(GraphIssue::NoTrigger);
        }

        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !seen.contains(end.as_str()) {
                    issues.push(GraphIssue::DanglingEdge {
                        edge_id: edge.id.clone(),
                        missing: end.clone(),
                    });
                }
            }

            let from_condition = self
                .node(&edge.source)
                .is_some_and(|n| n.kind == NodeKind::Condition);
            let labeled = matches!(edge.source_handle.as_deref(), Some("true") | Some("false"));
            if from_condition && !labeled {
                issues.push(GraphIssue::UnlabeledBranch {
                    edge_id: edge.id.clone(),
                    condition: edge.source.clone(),
                });
            }
        }

        issues
    }
}

// ── Typed config views ──────────────────────────────────────────

/// Agent node: LLM call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_prompt_template: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Script node: snippet evaluated with `input`, `context`, `console`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptConfig {
    #[serde(default)]
    pub code: Option<String>,
}

/// Condition node: boolean expression over `input`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConditionConfig {
    #[serde(default)]
    pub expression: Option<String>,
}

/// Request node: outbound HTTP call.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            url: None,
            body: None,
            headers: BTreeMap::new(),
        }
    }
}

/// Delay node. The editor stores the duration as whatever the number field
/// produced, so both numbers and numeric strings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelayConfig {
    #[serde(default)]
    pub duration: Option<Value>,
}

impl DelayConfig {
    pub fn millis(&self) -> Option<u64> {
        match self.duration.as_ref()? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64),
            _ => None,
        }
    }
}

/// Human-input node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Image-generation node.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageGenConfig {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            prompt: None,
            size: default_image_size(),
            model: None,
        }
    }
}
