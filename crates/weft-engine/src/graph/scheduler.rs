use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use weft_core::config::EngineConfig;
use weft_core::context::ExecutionContext;
use weft_core::event::EventBus;
use weft_core::graph::{Graph, Node, NodeKind};
use weft_core::types::{LogEntry, LogLevel, NodeStatus, RunEvent, RunId, RunOutcome};

use super::input::resolve_input;
use super::result::RunResult;
use crate::executors::{ExecutorRegistry, NodeCall};
use crate::tracker::RunTracker;

/// Drives a graph from its triggers to completion.
///
/// One node executes at a time. A node that fails is marked `Error` and
/// contributes no successors; the rest of the queue still runs.
pub struct Scheduler {
    registry: Arc<ExecutorRegistry>,
    config: EngineConfig,
    event_bus: Arc<EventBus>,
}

impl Scheduler {
    pub fn new(registry: ExecutorRegistry, config: EngineConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run with a fresh id.
    pub async fn run(&self, graph: &Graph, cancel: CancellationToken) -> RunResult {
        self.run_with_id(graph, RunId::new(), cancel).await
    }

    /// Run under a caller-chosen id (so a journal can subscribe first).
    pub async fn run_with_id(
        &self,
        graph: &Graph,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> RunResult {
        let start = Instant::now();
        let mut tracker = RunTracker::new(run_id.clone(), self.event_bus.clone());
        let mut context = ExecutionContext::new();
        let mut execution_order = Vec::new();
        let mut final_output = None;
        let mut steps = 0usize;

        tracker.reset(graph);
        self.event_bus.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
        });

        let nodes = index_nodes(graph);
        let mut queue: VecDeque<&Node> = graph.triggers().collect();

        let outcome = if queue.is_empty() {
            tracker.warn("No trigger node found");
            RunOutcome::NoTriggers
        } else {
            info!(%run_id, triggers = queue.len(), "Starting workflow execution");
            tracker.info("Starting workflow execution");

            let mut outcome = RunOutcome::Completed;
            while let Some(node) = queue.pop_front() {
                if cancel.is_cancelled() {
                    tracker.warn("Workflow execution stopped by user");
                    outcome = RunOutcome::Cancelled;
                    break;
                }
                if steps >= self.config.max_steps {
                    warn!(%run_id, max_steps = self.config.max_steps, "Step ceiling reached");
                    tracker.error(format!(
                        "Maximum execution steps ({}) exceeded",
                        self.config.max_steps
                    ));
                    outcome = RunOutcome::StepLimitExceeded;
                    break;
                }
                steps += 1;
                execution_order.push(node.id.clone());

                let Some(output) = self
                    .execute_node(graph, node, &mut context, &mut tracker, steps)
                    .await
                else {
                    continue;
                };

                if node.kind == NodeKind::Output {
                    final_output = Some(output.clone());
                }

                for next in successors(graph, &nodes, node, &output, &mut tracker) {
                    queue.push_back(next);
                }
            }
            outcome
        };

        if outcome == RunOutcome::Completed {
            if let Some(output) = &final_output {
                self.event_bus.publish(RunEvent::RunSummary {
                    run_id: run_id.clone(),
                    final_output: output.clone(),
                });
            }
            tracker.success("Workflow execution finished");
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(%run_id, ?outcome, steps, elapsed_ms, "Workflow run ended");

        self.event_bus.publish(RunEvent::RunFinished {
            run_id: run_id.clone(),
            outcome,
            steps,
        });

        let (statuses, log) = tracker.into_parts();
        RunResult {
            run_id,
            outcome,
            steps,
            execution_order,
            statuses,
            context,
            log,
            final_output,
            elapsed_ms,
        }
    }

    /// Execute one node. Returns its output on success; failures are logged
    /// and recorded on the node only.
    async fn execute_node(
        &self,
        graph: &Graph,
        node: &Node,
        context: &mut ExecutionContext,
        tracker: &mut RunTracker,
        step: usize,
    ) -> Option<Value> {
        let label = node.label().to_string();
        debug!(node_id = %node.id, kind = %node.kind, step, "Executing node");

        tracker.set_status(&node.id, NodeStatus::Running);
        tracker.node_log(node, LogLevel::Info, format!("Executing {}", label));

        let input = resolve_input(graph, context, &node.id);
        let result = self
            .registry
            .execute(NodeCall {
                node,
                input,
                context: &*context,
                tracker: &mut *tracker,
            })
            .await;

        match result {
            Ok(output) => {
                tracker.set_status(&node.id, NodeStatus::Completed);
                tracker.publish_output(&node.id, &output);
                context.record(node.id.clone(), output.clone());
                tracker.node_log(node, LogLevel::Success, format!("{} completed", label));
                Some(output)
            }
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "Node failed");
                tracker.set_status(&node.id, NodeStatus::Error);
                tracker.log(
                    LogEntry::new(LogLevel::Error, e.to_string())
                        .for_node(&node.id, &label)
                        .with_details(serde_json::json!({ "kind": node.kind.as_str() })),
                );
                None
            }
        }
    }
}

/// Node lookup by id. The first node wins when ids collide.
fn index_nodes(graph: &Graph) -> HashMap<&str, &Node> {
    let mut nodes = HashMap::with_capacity(graph.nodes.len());
    for node in &graph.nodes {
        nodes.entry(node.id.as_str()).or_insert(node);
    }
    nodes
}

/// Targets to enqueue after `node` completed with `output`.
///
/// Condition nodes only follow the edges whose source handle names the
/// computed branch; every other node fans out along all outgoing edges.
fn successors<'g>(
    graph: &'g Graph,
    nodes: &HashMap<&str, &'g Node>,
    node: &Node,
    output: &Value,
    tracker: &mut RunTracker,
) -> Vec<&'g Node> {
    let branch = if node.kind == NodeKind::Condition {
        Some(if output.as_bool().unwrap_or(false) {
            "true"
        } else {
            "false"
        })
    } else {
        None
    };

    let mut next = Vec::new();
    for edge in graph.outgoing(&node.id) {
        if let Some(branch) = branch {
            if edge.source_handle.as_deref() != Some(branch) {
                continue;
            }
        }
        match nodes.get(edge.target.as_str()) {
            Some(target) => next.push(*target),
            None => tracker.node_log(
                node,
                LogLevel::Warn,
                format!("Edge {} points to unknown node '{}'", edge.id, edge.target),
            ),
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::future::BoxFuture;
    use serde_json::json;
    use weft_core::error::Result;
    use weft_core::graph::Edge;
    use weft_test_utils::{
        GraphBuilder, MockHttpTransport, MockLlmClient, ScriptedHumanInput, StaticModelResolver,
    };

    use crate::evaluator::RhaiEvaluator;
    use crate::executors::{Collaborators, NodeExecutor};

    fn engine_config() -> EngineConfig {
        EngineConfig {
            legacy_delay_ms: 0,
            default_delay_ms: 0,
            ..Default::default()
        }
    }

    fn registry(http: MockHttpTransport) -> ExecutorRegistry {
        let collaborators = Collaborators {
            models: Arc::new(StaticModelResolver::new(Arc::new(MockLlmClient::new(&["ok"])))),
            evaluator: Arc::new(RhaiEvaluator::default()),
            http: Arc::new(http),
            human: Arc::new(ScriptedHumanInput::default()),
            images: None,
        };
        ExecutorRegistry::with_builtins(collaborators, &engine_config())
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(
            registry(MockHttpTransport::new()),
            engine_config(),
            Arc::new(EventBus::default()),
        )
    }

    async fn run(graph: &Graph) -> RunResult {
        scheduler().run(graph, CancellationToken::new()).await
    }

    fn messages(result: &RunResult) -> Vec<&str> {
        result.log.iter().map(|e| e.message.as_str()).collect()
    }

    #[tokio::test]
    async fn no_trigger_is_a_single_warning() {
        let graph = GraphBuilder::new()
            .script("s1", "return 1;")
            .output("o1", "Result")
            .edge("s1", "o1")
            .build();

        let result = run(&graph).await;

        assert_eq!(result.outcome, RunOutcome::NoTriggers);
        assert_eq!(result.log.len(), 1);
        assert_eq!(result.log[0].level, LogLevel::Warn);
        assert_eq!(result.log[0].message, "No trigger node found");
        assert!(result.execution_order.is_empty());
        assert_eq!(result.steps, 0);
        assert!(result.statuses.values().all(|s| *s == NodeStatus::Idle));
    }

    #[tokio::test]
    async fn output_flows_along_single_edge() {
        let graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .script("s1", "return input;")
            .edge("t1", "s1")
            .build();

        let result = run(&graph).await;

        assert_eq!(result.outcome, RunOutcome::Completed);
        assert_eq!(result.output("s1"), result.output("t1"));
        assert_eq!(result.output("s1"), Some(&json!("Start")));
    }

    #[tokio::test]
    async fn log_brackets_each_node() {
        let graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .output("o1", "Result")
            .edge("t1", "o1")
            .build();

        let result = run(&graph).await;

        assert_eq!(
            messages(&result),
            vec![
                "Starting workflow execution",
                "Executing Start",
                "Start completed",
                "Executing Result",
                "Result completed",
                "Workflow execution finished",
            ]
        );
        assert_eq!(result.final_output, Some(json!("Start")));
    }

    #[tokio::test]
    async fn condition_follows_only_matching_handle() {
        for (input_label, taken, skipped) in [("Start", "yes", "no"), ("Other", "no", "yes")] {
            let graph = GraphBuilder::new()
                .trigger("t1", input_label)
                .condition("c1", r#"input === "Start""#)
                .output("yes", "Yes")
                .output("no", "No")
                .edge("t1", "c1")
                .branch("c1", "true", "yes")
                .branch("c1", "false", "no")
                .build();

            let result = run(&graph).await;

            assert_eq!(result.status(taken), NodeStatus::Completed);
            assert_eq!(result.status(skipped), NodeStatus::Idle);
            assert!(!result.execution_order.contains(&skipped.to_string()));
            assert_eq!(result.final_output, Some(json!(input_label)));
        }
    }

    #[tokio::test]
    async fn condition_ignores_unlabeled_edges() {
        let graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .condition("c1", "true")
            .output("plain", "Plain")
            .edge("t1", "c1")
            .edge("c1", "plain")
            .build();

        let result = run(&graph).await;
        assert_eq!(result.status("c1"), NodeStatus::Completed);
        assert_eq!(result.status("plain"), NodeStatus::Idle);
    }

    #[tokio::test]
    async fn cycle_stops_at_step_ceiling() {
        let graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .output("a", "A")
            .output("b", "B")
            .edge("t1", "a")
            .edge("a", "b")
            .edge("b", "a")
            .build();

        let result = run(&graph).await;

        assert_eq!(result.outcome, RunOutcome::StepLimitExceeded);
        assert_eq!(result.steps, 50);
        assert_eq!(result.execution_order.len(), 50);
        let last = result.log.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert_eq!(last.message, "Maximum execution steps (50) exceeded");
        assert!(!messages(&result).contains(&"Workflow execution finished"));
    }

    #[tokio::test]
    async fn configured_ceiling_is_honored() {
        let graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .output("a", "A")
            .edge("t1", "a")
            .edge("a", "a")
            .build();

        let config = EngineConfig {
            max_steps: 5,
            ..engine_config()
        };
        let scheduler = Scheduler::new(
            registry(MockHttpTransport::new()),
            config,
            Arc::new(EventBus::default()),
        );
        let result = scheduler.run(&graph, CancellationToken::new()).await;
        assert_eq!(result.steps, 5);
        assert_eq!(
            result.log.last().unwrap().message,
            "Maximum execution steps (5) exceeded"
        );
    }

    #[tokio::test]
    async fn failure_is_local_to_the_node() {
        // r1 has no url and fails; its successor never runs, its sibling does
        let graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .node(Node::new("r1", NodeKind::Request).with_label("Fetch"))
            .script("s1", r#"return input + "!";"#)
            .output("after_fetch", "After fetch")
            .edge("t1", "r1")
            .edge("t1", "s1")
            .edge("r1", "after_fetch")
            .build();

        let result = run(&graph).await;

        assert_eq!(result.outcome, RunOutcome::Completed);
        assert_eq!(result.status("r1"), NodeStatus::Error);
        assert_eq!(result.status("s1"), NodeStatus::Completed);
        assert_eq!(result.status("after_fetch"), NodeStatus::Idle);
        assert_eq!(result.output("s1"), Some(&json!("Start!")));
        assert!(result.output("r1").is_none());
        assert_eq!(result.failed_nodes(), vec!["r1"]);

        let error = result.entries_at(LogLevel::Error).next().unwrap();
        assert_eq!(error.node_id.as_deref(), Some("r1"));
        assert_eq!(error.node_label.as_deref(), Some("Fetch"));
    }

    #[tokio::test]
    async fn rerun_is_deterministic() {
        let graph = GraphBuilder::new()
            .trigger("t1", "One")
            .trigger("t2", "Two")
            .script("s1", "return input;")
            .script("s2", "return input;")
            .output("o1", "Out")
            .edge("t1", "s1")
            .edge("t2", "s2")
            .edge("s1", "o1")
            .edge("s2", "o1")
            .build();

        let scheduler = scheduler();
        let first = scheduler.run(&graph, CancellationToken::new()).await;
        let second = scheduler.run(&graph, CancellationToken::new()).await;

        assert_eq!(first.execution_order, vec!["t1", "t2", "s1", "s2", "o1", "o1"]);
        assert_eq!(first.execution_order, second.execution_order);
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn pre_cancelled_run_executes_nothing() {
        let graph = GraphBuilder::new().trigger("t1", "Start").build();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = scheduler().run(&graph, cancel).await;

        assert_eq!(result.outcome, RunOutcome::Cancelled);
        assert!(result.execution_order.is_empty());
        let last = result.log.last().unwrap();
        assert_eq!(last.level, LogLevel::Warn);
        assert_eq!(last.message, "Workflow execution stopped by user");
    }

    struct CancelOnRun(CancellationToken);

    impl NodeExecutor for CancelOnRun {
        fn kind(&self) -> NodeKind {
            NodeKind::Default
        }

        fn execute<'a>(&'a self, _call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
            self.0.cancel();
            Box::pin(async move { Ok(json!("stopping")) })
        }
    }

    #[tokio::test]
    async fn cancellation_is_checked_between_steps() {
        let cancel = CancellationToken::new();
        let mut registry = registry(MockHttpTransport::new());
        registry.register(CancelOnRun(cancel.clone()));
        let scheduler = Scheduler::new(registry, engine_config(), Arc::new(EventBus::default()));

        let graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .node(Node::new("stop", NodeKind::Default))
            .output("o1", "Never")
            .edge("t1", "stop")
            .edge("stop", "o1")
            .build();

        let result = scheduler.run(&graph, cancel).await;

        assert_eq!(result.outcome, RunOutcome::Cancelled);
        // The in-flight node finishes; nothing after it starts
        assert_eq!(result.status("stop"), NodeStatus::Completed);
        assert_eq!(result.status("o1"), NodeStatus::Idle);
        assert!(result.final_output.is_none());
    }

    #[tokio::test]
    async fn unknown_edge_target_is_skipped_with_warning() {
        let graph = Graph::new(
            vec![Node::new("t1", NodeKind::Trigger).with_label("Start")],
            vec![Edge::new("t1", "ghost")],
        );

        let result = run(&graph).await;

        assert_eq!(result.outcome, RunOutcome::Completed);
        assert_eq!(result.execution_order, vec!["t1"]);
        let warn = result.entries_at(LogLevel::Warn).next().unwrap();
        assert!(warn.message.contains("ghost"));
    }

    #[tokio::test]
    async fn request_logs_method_and_url() {
        let http = MockHttpTransport::new().with_json(200, json!({"id": 1}));
        let scheduler = Scheduler::new(registry(http), engine_config(), Arc::new(EventBus::default()));
        let graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .request("r1", "GET", "https://api.example.com/items/1")
            .edge("t1", "r1")
            .build();

        let result = scheduler.run(&graph, CancellationToken::new()).await;

        assert_eq!(result.output("r1"), Some(&json!({"id": 1})));
        let r1_messages: Vec<&str> = result
            .log
            .iter()
            .filter(|e| e.node_id.as_deref() == Some("r1"))
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(
            r1_messages,
            vec!["Executing r1", "GET https://api.example.com/items/1", "r1 completed"]
        );
    }

    #[tokio::test]
    async fn events_mirror_the_run() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let scheduler = Scheduler::new(registry(MockHttpTransport::new()), engine_config(), bus);
        let graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .output("o1", "Result")
            .edge("t1", "o1")
            .build();

        let result = scheduler.run(&graph, CancellationToken::new()).await;

        let mut summary = None;
        let mut finished = None;
        let mut outputs = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                RunEvent::RunSummary { final_output, .. } => summary = Some(final_output),
                RunEvent::RunFinished { outcome, steps, .. } => finished = Some((outcome, steps)),
                RunEvent::NodeOutput { .. } => outputs += 1,
                _ => {}
            }
        }
        assert_eq!(summary, Some(json!("Start")));
        assert_eq!(finished, Some((RunOutcome::Completed, 2)));
        assert_eq!(outputs, 2);
        assert_eq!(result.steps, 2);
    }

    #[tokio::test]
    async fn annotate_writes_runtime_fields() {
        let mut graph = GraphBuilder::new()
            .trigger("t1", "Start")
            .condition("c1", "false")
            .output("yes", "Yes")
            .edge("t1", "c1")
            .branch("c1", "true", "yes")
            .build();

        let result = run(&graph).await;
        result.annotate(&mut graph);

        let c1 = graph.node("c1").unwrap();
        assert_eq!(c1.data.execution_status, Some(NodeStatus::Completed));
        assert_eq!(c1.data.last_output, Some(json!(false)));
        let yes = graph.node("yes").unwrap();
        assert_eq!(yes.data.execution_status, Some(NodeStatus::Idle));
        assert!(yes.data.last_output.is_none());
    }

    #[tokio::test]
    async fn missing_executor_marks_node_error() {
        let scheduler = Scheduler::new(
            ExecutorRegistry::new(),
            engine_config(),
            Arc::new(EventBus::default()),
        );
        let graph = GraphBuilder::new().trigger("t1", "Start").build();

        let result = scheduler.run(&graph, CancellationToken::new()).await;

        assert_eq!(result.status("t1"), NodeStatus::Error);
        assert!(result
            .entries_at(LogLevel::Error)
            .any(|e| e.message.contains("trigger")));
    }
}
