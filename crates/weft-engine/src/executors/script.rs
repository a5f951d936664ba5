use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::warn;

use weft_core::error::{Result, WeftError};
use weft_core::graph::{NodeKind, ScriptConfig};
use weft_core::traits::Evaluator;
use weft_core::types::{EvalScope, LogLevel};

use super::{non_blank, NodeCall, NodeExecutor};

/// Evaluates the node's `code` with `input`, `context` and `console` bound.
///
/// Evaluation failures do not fail the node: they become the string
/// `Error: <message>` so downstream nodes still receive a value.
pub struct ScriptExecutor {
    evaluator: Arc<dyn Evaluator>,
}

impl ScriptExecutor {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }
}

impl NodeExecutor for ScriptExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Script
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let config: ScriptConfig = call.node.config()?;
            let code = non_blank(config.code)
                .ok_or_else(|| WeftError::missing_field(NodeKind::Script.as_str(), "code"))?;

            let scope = EvalScope {
                input: call.input,
                context: call.context.as_json(),
            };

            match self.evaluator.run_script(&code, &scope) {
                Ok(output) => {
                    for line in output.console {
                        call.tracker.node_log(call.node, line.level, line.text);
                    }
                    Ok(output.value)
                }
                Err(e) => {
                    let message = match e {
                        WeftError::Script(message) => message,
                        other => other.to_string(),
                    };
                    warn!(node_id = %call.node.id, error = %message, "Script failed");
                    call.tracker.node_log(
                        call.node,
                        LogLevel::Warn,
                        format!("Script error: {}", message),
                    );
                    Ok(Value::String(format!("Error: {}", message)))
                }
            }
        })
    }
}
