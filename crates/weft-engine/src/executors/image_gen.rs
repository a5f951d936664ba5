use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use weft_core::context::stringify;
use weft_core::error::{Result, WeftError};
use weft_core::graph::{ImageGenConfig, NodeKind};
use weft_core::traits::ImageGenerator;
use weft_core::types::{ImageRequest, LogLevel};

use super::{fill_template, non_blank, NodeCall, NodeExecutor};

/// Generates an image from the node's prompt; the output is the image
/// reference (URL or `data:` URI).
pub struct ImageGenExecutor {
    images: Option<Arc<dyn ImageGenerator>>,
}

impl ImageGenExecutor {
    pub fn new(images: Option<Arc<dyn ImageGenerator>>) -> Self {
        Self { images }
    }
}

impl NodeExecutor for ImageGenExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::ImageGen
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let config: ImageGenConfig = call.node.config()?;
            let prompt = non_blank(config.prompt)
                .ok_or_else(|| WeftError::missing_field(NodeKind::ImageGen.as_str(), "prompt"))?;
            let prompt = fill_template(&prompt, &stringify(&call.input));

            let images = self.images.as_ref().ok_or_else(|| {
                WeftError::ImageGeneration("no image provider configured".to_string())
            })?;

            call.tracker.node_log(
                call.node,
                LogLevel::Info,
                format!("Generating {} image", config.size),
            );

            let image = images
                .generate(ImageRequest {
                    prompt,
                    size: config.size,
                    model: non_blank(config.model),
                })
                .await?;

            if let Some(revised) = &image.revised_prompt {
                call.tracker
                    .node_log(call.node, LogLevel::Info, format!("Revised prompt: {}", revised));
            }

            Ok(Value::String(image.reference))
        })
    }
}
