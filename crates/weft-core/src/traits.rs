use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Streaming text completion.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// A model id resolved to a callable client plus its effective settings.
#[derive(Clone)]
pub struct ResolvedModel {
    pub client: Arc<dyn LlmClient>,
    pub config: ModelConfig,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("provider", &self.config.provider)
            .field("model_id", &self.config.model_id)
            .finish()
    }
}

/// Maps a node's model id to a streaming client.
///
/// `None` means "whatever the active provider is". Implementations must
/// fail with `WeftError::NoActiveProvider` before any request is sent.
pub trait ModelResolver: Send + Sync + 'static {
    fn resolve(&self, model: Option<&str>) -> Result<ResolvedModel>;
}

/// Image generation capability.
pub trait ImageGenerator: Send + Sync + 'static {
    fn generate(&self, request: ImageRequest) -> BoxFuture<'_, Result<GeneratedImage>>;
}

/// Human-in-the-loop channel. Resolves to `None` when the human declines.
pub trait HumanInput: Send + Sync + 'static {
    fn request(&self, request: InputRequest) -> BoxFuture<'_, Result<Option<String>>>;
}

/// Outbound HTTP capability used by request nodes.
pub trait HttpTransport: Send + Sync + 'static {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}

/// Sandboxed evaluator for script and condition snippets.
///
/// Evaluation is synchronous and bounded by the implementation's own
/// operation limits. Failures are `WeftError::Script`.
pub trait Evaluator: Send + Sync + 'static {
    /// Run a script body and return its value plus captured console lines.
    fn run_script(&self, source: &str, scope: &EvalScope) -> Result<ScriptOutput>;

    /// Evaluate a boolean expression.
    fn check_condition(&self, expression: &str, scope: &EvalScope) -> Result<bool>;
}
