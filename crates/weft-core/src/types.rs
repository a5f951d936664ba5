use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution status of a single node within a run.
///
/// `Idle -> Running -> {Completed, Error}`. `Error` is terminal for the node
/// but never for the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Success => "success",
        };
        f.write_str(s)
    }
}

/// One entry of the ordered, append-only run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_label: Option<String>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            node_id: None,
            node_label: None,
            level,
            message: message.into(),
            details: None,
        }
    }

    pub fn for_node(mut self, node_id: impl Into<String>, label: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self.node_label = Some(label.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The queue drained.
    Completed,
    /// The graph had no trigger node; nothing ran.
    NoTriggers,
    /// The cancellation token fired between two steps.
    Cancelled,
    /// The step ceiling was reached.
    StepLimitExceeded,
}

/// A pending request for a value from a human.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub node_id: String,
    pub prompt: String,
    pub timestamp: DateTime<Utc>,
}

impl InputRequest {
    pub fn new(node_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: None,
            node_id: node_id.into(),
            prompt: prompt.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Run event broadcast to all subscribers (the UI, the JSONL journal, the CLI).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Run started.
    RunStarted { run_id: RunId },
    /// A log entry was appended.
    Log { run_id: RunId, entry: LogEntry },
    /// A node moved to a new status.
    NodeStatusChanged {
        run_id: RunId,
        node_id: String,
        status: NodeStatus,
    },
    /// A node produced its output (mirrors the editor's `lastOutput`).
    NodeOutput {
        run_id: RunId,
        node_id: String,
        output: serde_json::Value,
    },
    /// Text streaming from an agent node.
    AgentDelta {
        run_id: RunId,
        node_id: String,
        text: String,
    },
    /// A node is waiting on a human.
    InputRequested { request: InputRequest },
    /// A pending human-input request was answered or declined.
    InputResolved {
        #[serde(skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        request_id: String,
        provided: bool,
    },
    /// The run captured a final Output value.
    RunSummary {
        run_id: RunId,
        final_output: serde_json::Value,
    },
    /// The run loop stopped.
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        steps: usize,
    },
}

impl RunEvent {
    /// The run this event belongs to, if it is tied to one.
    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            Self::RunStarted { run_id }
            | Self::Log { run_id, .. }
            | Self::NodeStatusChanged { run_id, .. }
            | Self::NodeOutput { run_id, .. }
            | Self::AgentDelta { run_id, .. }
            | Self::RunSummary { run_id, .. }
            | Self::RunFinished { run_id, .. } => Some(run_id),
            Self::InputRequested { request } => request.run_id.as_ref(),
            Self::InputResolved { run_id, .. } => run_id.as_ref(),
        }
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to a text-completion model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Request for an image-generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A generated image: either a remote URL or a `data:` URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

/// Outbound HTTP request issued by a request node.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// Raw HTTP response handed back to the request node.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Bindings visible to a script or condition snippet.
#[derive(Debug, Clone, Default)]
pub struct EvalScope {
    pub input: serde_json::Value,
    pub context: serde_json::Value,
}

/// Result of evaluating a script snippet.
#[derive(Debug, Clone, Default)]
pub struct ScriptOutput {
    pub value: serde_json::Value,
    /// Lines written through `console.*`, `print` or `debug`, in order.
    pub console: Vec<ConsoleLine>,
}

/// A single captured console line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleLine {
    pub level: LogLevel,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_status_serializes_lowercase() {
        let json = serde_json::to_string(&NodeStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let parsed: NodeStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, NodeStatus::Error);
    }

    #[test]
    fn log_entry_builders() {
        let entry = LogEntry::new(LogLevel::Warn, "careful")
            .for_node("n1", "Fetch")
            .with_details(serde_json::json!({"status": 500}));

        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.node_id.as_deref(), Some("n1"));
        assert_eq!(entry.node_label.as_deref(), Some("Fetch"));
        assert_eq!(entry.details, Some(serde_json::json!({"status": 500})));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["nodeId"], "n1");
        assert_eq!(json["level"], "warn");
    }

    #[test]
    fn run_event_is_tagged() {
        let run_id = RunId::new();
        let event = RunEvent::NodeStatusChanged {
            run_id: run_id.clone(),
            node_id: "a".into(),
            status: NodeStatus::Running,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_status_changed");
        assert_eq!(json["status"], "running");
        assert_eq!(event.run_id(), Some(&run_id));
    }

    #[test]
    fn every_run_scoped_event_names_its_run() {
        let run_id = RunId::new();
        let request = InputRequest::new("ask", "Name?").for_run(run_id.clone());
        assert_eq!(
            RunEvent::InputRequested { request }.run_id(),
            Some(&run_id)
        );

        let unscoped = RunEvent::InputRequested {
            request: InputRequest::new("ask", "Name?"),
        };
        assert_eq!(unscoped.run_id(), None);

        let delta = RunEvent::AgentDelta {
            run_id: run_id.clone(),
            node_id: "a1".into(),
            text: "hi".into(),
        };
        assert_eq!(delta.run_id(), Some(&run_id));
        assert_eq!(serde_json::to_value(&delta).unwrap()["run_id"], run_id.to_string());
    }

    #[test]
    fn http_response_success_range() {
        assert!(HttpResponse { status: 204, body: String::new() }.is_success());
        assert!(!HttpResponse { status: 404, body: String::new() }.is_success());
    }
}
