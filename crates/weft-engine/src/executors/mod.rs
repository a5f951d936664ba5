//! Node executors: one behavior per node type.
//!
//! An executor receives the node, its resolved input, a read-only view of
//! the run context, and the tracker (for node-scoped log lines and streamed
//! deltas). It returns the node's output or an error; the scheduler owns
//! status transitions and successor resolution.

pub mod agent;
pub mod condition;
pub mod image_gen;
pub mod input;
pub mod passthrough;
pub mod request;
pub mod script;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use weft_core::config::EngineConfig;
use weft_core::context::ExecutionContext;
use weft_core::error::{Result, WeftError};
use weft_core::graph::{Node, NodeKind};
use weft_core::traits::{Evaluator, HttpTransport, HumanInput, ImageGenerator, ModelResolver};

use crate::tracker::RunTracker;

/// Everything an executor may touch while a node runs.
pub struct NodeCall<'a> {
    pub node: &'a Node,
    pub input: Value,
    pub context: &'a ExecutionContext,
    pub tracker: &'a mut RunTracker,
}

/// Behavior for one node type.
pub trait NodeExecutor: Send + Sync + 'static {
    fn kind(&self) -> NodeKind;

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>>;
}

/// External capabilities the built-in executors depend on.
#[derive(Clone)]
pub struct Collaborators {
    pub models: Arc<dyn ModelResolver>,
    pub evaluator: Arc<dyn Evaluator>,
    pub http: Arc<dyn HttpTransport>,
    pub human: Arc<dyn HumanInput>,
    pub images: Option<Arc<dyn ImageGenerator>>,
}

/// Registry of executors keyed by node type.
pub struct ExecutorRegistry {
    executors: HashMap<NodeKind, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Register an executor, replacing any existing one for the same type.
    pub fn register(&mut self, executor: impl NodeExecutor) {
        self.executors.insert(executor.kind(), Arc::new(executor));
    }

    pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(&kind).cloned()
    }

    /// Registered node types, in declaration order.
    pub fn kinds(&self) -> Vec<NodeKind> {
        NodeKind::all()
            .iter()
            .copied()
            .filter(|k| self.executors.contains_key(k))
            .collect()
    }

    /// Run the executor registered for the node's type.
    pub async fn execute(&self, call: NodeCall<'_>) -> Result<Value> {
        let kind = call.node.kind;
        let executor = self
            .get(kind)
            .ok_or_else(|| WeftError::ExecutorNotFound(kind.to_string()))?;
        executor.execute(call).await
    }

    /// Create a registry with an executor for every node type.
    pub fn with_builtins(collaborators: Collaborators, config: &EngineConfig) -> Self {
        let mut registry = Self::new();

        registry.register(passthrough::TriggerExecutor);
        registry.register(passthrough::OutputExecutor);
        registry.register(passthrough::DelayExecutor::new(config.default_delay_ms));
        registry.register(passthrough::LegacyExecutor::new(config.legacy_delay_ms));
        registry.register(agent::AgentExecutor::new(collaborators.models));
        registry.register(script::ScriptExecutor::new(collaborators.evaluator.clone()));
        registry.register(condition::ConditionExecutor::new(collaborators.evaluator));
        registry.register(request::RequestExecutor::new(collaborators.http));
        registry.register(input::InputExecutor::new(collaborators.human));
        registry.register(image_gen::ImageGenExecutor::new(collaborators.images));

        registry
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Substitute every literal `{{input}}` token in a template.
pub(crate) fn fill_template(template: &str, input: &str) -> String {
    template.replace("{{input}}", input)
}

/// Treat blank config strings as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::event::EventBus;
    use weft_core::types::RunId;
    use weft_test_utils::{
        MockHttpTransport, MockLlmClient, ScriptedHumanInput, StaticModelResolver,
    };

    use crate::evaluator::RhaiEvaluator;

    fn collaborators() -> Collaborators {
        Collaborators {
            models: Arc::new(StaticModelResolver::new(Arc::new(MockLlmClient::new(&["hi"])))),
            evaluator: Arc::new(RhaiEvaluator::default()),
            http: Arc::new(MockHttpTransport::new()),
            human: Arc::new(ScriptedHumanInput::default()),
            images: None,
        }
    }

    #[test]
    fn builtins_cover_every_kind() {
        let registry = ExecutorRegistry::with_builtins(collaborators(), &EngineConfig::default());
        assert_eq!(registry.kinds(), NodeKind::all().to_vec());
    }

    #[tokio::test]
    async fn missing_executor_is_reported() {
        let registry = ExecutorRegistry::new();
        let node = Node::new("t", NodeKind::Trigger);
        let context = ExecutionContext::new();
        let mut tracker = RunTracker::new(RunId::new(), Arc::new(EventBus::default()));

        let err = registry
            .execute(NodeCall {
                node: &node,
                input: Value::Null,
                context: &context,
                tracker: &mut tracker,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::ExecutorNotFound(kind) if kind == "trigger"));
    }

    #[test]
    fn template_replaces_every_token() {
        assert_eq!(fill_template("{{input}} and {{input}}", "x"), "x and x");
        assert_eq!(fill_template("no token", "x"), "no token");
    }
}
