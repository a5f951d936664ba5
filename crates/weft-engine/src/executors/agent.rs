use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;

use weft_core::context::stringify;
use weft_core::error::Result;
use weft_core::graph::{AgentConfig, NodeKind};
use weft_core::traits::ModelResolver;
use weft_core::types::{ChatMessage, LogLevel, StreamDelta};

use super::{fill_template, non_blank, NodeCall, NodeExecutor};

/// Streams a text completion from the resolved model.
///
/// The prompt is the node's `userPromptTemplate` with `{{input}}` replaced
/// by the resolved input, or the raw input when no template is set. The
/// node's `role` becomes the system instruction.
pub struct AgentExecutor {
    models: Arc<dyn ModelResolver>,
}

impl AgentExecutor {
    pub fn new(models: Arc<dyn ModelResolver>) -> Self {
        Self { models }
    }
}

impl NodeExecutor for AgentExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Agent
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let NodeCall {
                node,
                input,
                tracker,
                ..
            } = call;
            let config: AgentConfig = node.config()?;

            // Fails before anything is sent when no provider is configured
            let resolved = self.models.resolve(config.model.as_deref())?;

            let input = stringify(&input);
            let prompt = match non_blank(config.user_prompt_template) {
                Some(template) => fill_template(&template, &input),
                None => input,
            };

            let mut messages = Vec::with_capacity(2);
            if let Some(role) = non_blank(config.role) {
                messages.push(ChatMessage::system(role));
            }
            messages.push(ChatMessage::user(prompt));

            tracker.node_log(
                node,
                LogLevel::Info,
                format!(
                    "Calling {} ({})",
                    resolved.config.model_id, resolved.config.provider
                ),
            );

            let mut stream = resolved
                .client
                .chat_stream(&resolved.config, messages)
                .await?;

            let mut text = String::new();
            while let Some(delta) = stream.next().await {
                match delta? {
                    StreamDelta::TextDelta(chunk) => {
                        tracker.agent_delta(&node.id, &chunk);
                        text.push_str(&chunk);
                    }
                    StreamDelta::Usage {
                        input_tokens,
                        output_tokens,
                    } => {
                        debug!(node_id = %node.id, input_tokens, output_tokens, "Agent usage");
                    }
                    StreamDelta::Stop(reason) => {
                        debug!(node_id = %node.id, ?reason, "Agent stream stopped");
                    }
                }
            }

            Ok(Value::String(text))
        })
    }
}
