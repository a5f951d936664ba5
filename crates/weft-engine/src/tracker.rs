use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use weft_core::event::EventBus;
use weft_core::graph::{Graph, Node};
use weft_core::types::{LogEntry, LogLevel, NodeStatus, RunEvent, RunId};

/// Per-run status map and append-only log.
///
/// The scheduler is the only writer. Every mutation is mirrored onto the
/// event bus so a UI can follow the run live; the tracker itself is the
/// authoritative copy handed back in the `RunResult`.
pub struct RunTracker {
    run_id: RunId,
    statuses: HashMap<String, NodeStatus>,
    log: Vec<LogEntry>,
    event_bus: Arc<EventBus>,
}

impl RunTracker {
    pub fn new(run_id: RunId, event_bus: Arc<EventBus>) -> Self {
        Self {
            run_id,
            statuses: HashMap::new(),
            log: Vec::new(),
            event_bus,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Put every node of the graph back to `Idle`.
    pub fn reset(&mut self, graph: &Graph) {
        self.statuses.clear();
        for node in &graph.nodes {
            self.set_status(&node.id, NodeStatus::Idle);
        }
    }

    pub fn set_status(&mut self, node_id: &str, status: NodeStatus) {
        self.statuses.insert(node_id.to_string(), status);
        self.event_bus.publish(RunEvent::NodeStatusChanged {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            status,
        });
    }

    /// Status of a node; nodes the run never touched are `Idle`.
    pub fn status(&self, node_id: &str) -> NodeStatus {
        self.statuses.get(node_id).copied().unwrap_or_default()
    }

    pub fn statuses(&self) -> &HashMap<String, NodeStatus> {
        &self.statuses
    }

    /// Append an entry to the run log.
    pub fn log(&mut self, entry: LogEntry) {
        debug!(
            run_id = %self.run_id,
            level = %entry.level,
            node_id = entry.node_id.as_deref().unwrap_or("-"),
            "{}",
            entry.message
        );
        self.event_bus.publish(RunEvent::Log {
            run_id: self.run_id.clone(),
            entry: entry.clone(),
        });
        self.log.push(entry);
    }

    /// Append an entry attributed to a node.
    pub fn node_log(&mut self, node: &Node, level: LogLevel, message: impl Into<String>) {
        self.log(LogEntry::new(level, message).for_node(&node.id, node.label()));
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, message));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, message));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, message));
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Success, message));
    }

    /// Publish a node's output (the editor's `lastOutput`).
    pub fn publish_output(&self, node_id: &str, output: &Value) {
        self.event_bus.publish(RunEvent::NodeOutput {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            output: output.clone(),
        });
    }

    /// Forward a streamed chunk of agent text.
    pub fn agent_delta(&self, node_id: &str, text: &str) {
        self.event_bus.publish(RunEvent::AgentDelta {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            text: text.to_string(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.log
    }

    /// Consume the tracker, returning the status map and the log.
    pub fn into_parts(self) -> (HashMap<String, NodeStatus>, Vec<LogEntry>) {
        (self.statuses, self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::graph::NodeKind;

    #[test]
    fn unknown_nodes_are_idle() {
        let tracker = RunTracker::new(RunId::new(), Arc::new(EventBus::default()));
        assert_eq!(tracker.status("nope"), NodeStatus::Idle);
    }

    #[test]
    fn log_is_ordered_and_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let run_id = RunId::new();
        let mut tracker = RunTracker::new(run_id.clone(), bus);

        let node = Node::new("n1", NodeKind::Script).with_label("Shape");
        tracker.info("first");
        tracker.node_log(&node, LogLevel::Warn, "second");

        let messages: Vec<_> = tracker.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(tracker.entries()[1].node_label.as_deref(), Some("Shape"));

        assert!(matches!(rx.try_recv().unwrap(), RunEvent::Log { entry, .. } if entry.message == "first"));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.run_id(), Some(&run_id));
        assert!(matches!(second, RunEvent::Log { entry, .. } if entry.level == LogLevel::Warn));
    }

    #[test]
    fn reset_marks_every_node_idle() {
        let bus = Arc::new(EventBus::default());
        let mut tracker = RunTracker::new(RunId::new(), bus);
        tracker.set_status("a", NodeStatus::Error);

        let graph = Graph::new(
            vec![
                Node::new("a", NodeKind::Trigger),
                Node::new("b", NodeKind::Output),
            ],
            vec![],
        );
        tracker.reset(&graph);

        assert_eq!(tracker.statuses().len(), 2);
        assert_eq!(tracker.status("a"), NodeStatus::Idle);
    }
}
