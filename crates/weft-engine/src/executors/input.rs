use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use weft_core::error::{Result, WeftError};
use weft_core::graph::{InputConfig, NodeKind};
use weft_core::traits::HumanInput;
use weft_core::types::{InputRequest, LogLevel};

use super::{non_blank, NodeCall, NodeExecutor};

pub const DEFAULT_PROMPT: &str = "Please provide input";

/// Suspends until a human answers the node's prompt.
pub struct InputExecutor {
    human: Arc<dyn HumanInput>,
}

impl InputExecutor {
    pub fn new(human: Arc<dyn HumanInput>) -> Self {
        Self { human }
    }
}

impl NodeExecutor for InputExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Input
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let config: InputConfig = call.node.config()?;
            let prompt = non_blank(config.prompt).unwrap_or_else(|| DEFAULT_PROMPT.to_string());

            call.tracker.node_log(
                call.node,
                LogLevel::Info,
                format!("Waiting for input: {}", prompt),
            );

            let request =
                InputRequest::new(&call.node.id, prompt).for_run(call.tracker.run_id().clone());
            match self.human.request(request).await? {
                Some(answer) => Ok(Value::String(answer)),
                None => Err(WeftError::InputDeclined(call.node.label().to_string())),
            }
        })
    }
}
