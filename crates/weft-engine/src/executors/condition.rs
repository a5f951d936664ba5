use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use weft_core::error::{Result, WeftError};
use weft_core::graph::{ConditionConfig, NodeKind};
use weft_core::traits::Evaluator;
use weft_core::types::{EvalScope, LogLevel};

use super::{non_blank, NodeCall, NodeExecutor};

/// Evaluates a boolean expression over `input`.
///
/// The output is the boolean itself; the scheduler reads it to pick the
/// `true` or `false` handle.
pub struct ConditionExecutor {
    evaluator: Arc<dyn Evaluator>,
}

impl ConditionExecutor {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

impl NodeExecutor for ConditionExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let config: ConditionConfig = call.node.config()?;
            let expression = non_blank(config.expression).ok_or_else(|| {
                WeftError::missing_field(NodeKind::Condition.as_str(), "expression")
            })?;

            let scope = EvalScope {
                input: call.input,
                context: call.context.as_json(),
            };
            let verdict = self.evaluator.check_condition(&expression, &scope)?;

            call.tracker.node_log(
                call.node,
                LogLevel::Info,
                format!("Condition evaluated to {}", verdict),
            );
            Ok(Value::Bool(verdict))
        })
    }
}
