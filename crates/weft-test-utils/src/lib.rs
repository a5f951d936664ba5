//! Mocks for every collaborator trait plus a fluent graph builder.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use serde_json::Value;

use weft_core::config::ModelConfig;
use weft_core::error::{Result, WeftError};
use weft_core::graph::{Edge, Graph, Node, NodeKind};
use weft_core::traits::{HttpTransport, HumanInput, ImageGenerator, LlmClient, ModelResolver, ResolvedModel};
use weft_core::types::*;

// ── LLM ─────────────────────────────────────────────────────────

/// Streams a fixed list of text chunks and records every call.
#[derive(Default)]
pub struct MockLlmClient {
    chunks: Vec<String>,
    fail_mid_stream: Option<String>,
    calls: Mutex<Vec<(ModelConfig, Vec<ChatMessage>)>>,
}

impl MockLlmClient {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Yield the chunks, then a stream error.
    pub fn failing_after(chunks: &[&str], message: &str) -> Self {
        Self {
            fail_mid_stream: Some(message.to_string()),
            ..Self::new(chunks)
        }
    }

    pub fn calls(&self) -> Vec<(ModelConfig, Vec<ChatMessage>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl LlmClient for MockLlmClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.calls.lock().unwrap().push((config.clone(), messages));

        let mut items: Vec<Result<StreamDelta>> = self
            .chunks
            .iter()
            .map(|c| Ok(StreamDelta::TextDelta(c.clone())))
            .collect();
        match &self.fail_mid_stream {
            Some(msg) => items.push(Err(WeftError::LlmStream(msg.clone()))),
            None => items.push(Ok(StreamDelta::Stop(StopReason::EndTurn))),
        }

        Box::pin(async move {
            Ok::<_, WeftError>(Box::pin(stream::iter(items)) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}

/// Resolves every model id to one client; `None` client means no provider.
pub struct StaticModelResolver {
    client: Option<Arc<dyn LlmClient>>,
    requested: Mutex<Vec<Option<String>>>,
}

impl StaticModelResolver {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client: Some(client),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            client: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<Option<String>> {
        self.requested.lock().unwrap().clone()
    }
}

impl ModelResolver for StaticModelResolver {
    fn resolve(&self, model: Option<&str>) -> Result<ResolvedModel> {
        self.requested.lock().unwrap().push(model.map(str::to_string));
        let client = self
            .client
            .clone()
            .ok_or_else(|| WeftError::NoActiveProvider("no active provider".to_string()))?;
        Ok(ResolvedModel {
            client,
            config: ModelConfig::new("mock", model.unwrap_or("mock-model")),
        })
    }
}

// ── Human input ─────────────────────────────────────────────────

/// Answers input requests from a queue; an exhausted queue declines.
#[derive(Default)]
pub struct ScriptedHumanInput {
    responses: Mutex<VecDeque<Option<String>>>,
    requests: Mutex<Vec<InputRequest>>,
}

impl ScriptedHumanInput {
    pub fn new(responses: Vec<Option<&str>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| r.map(str::to_string)).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<InputRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HumanInput for ScriptedHumanInput {
    fn request(&self, request: InputRequest) -> BoxFuture<'_, Result<Option<String>>> {
        self.requests.lock().unwrap().push(request);
        let answer = self.responses.lock().unwrap().pop_front().flatten();
        Box::pin(async move { Ok::<_, WeftError>(answer) })
    }
}

// ── HTTP ────────────────────────────────────────────────────────

/// Returns canned responses in order and records every request.
#[derive(Default)]
pub struct MockHttpTransport {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            body: body.to_string(),
        }));
        self
    }

    pub fn with_json(self, status: u16, body: Value) -> Self {
        self.with_response(status, &body.to_string())
    }

    pub fn with_error(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(WeftError::Http(message.to_string())));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpTransport for MockHttpTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        self.requests.lock().unwrap().push(request);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(WeftError::Http("no canned response left".to_string())));
        Box::pin(async move { response })
    }
}

// ── Images ──────────────────────────────────────────────────────

/// Returns a fixed image reference and records prompts.
pub struct MockImageGenerator {
    reference: String,
    requests: Mutex<Vec<ImageRequest>>,
}

impl MockImageGenerator {
    pub fn new(reference: &str) -> Self {
        Self {
            reference: reference.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ImageGenerator for MockImageGenerator {
    fn generate(&self, request: ImageRequest) -> BoxFuture<'_, Result<GeneratedImage>> {
        self.requests.lock().unwrap().push(request);
        let image = GeneratedImage {
            reference: self.reference.clone(),
            revised_prompt: None,
        };
        Box::pin(async move { Ok::<_, WeftError>(image) })
    }
}

// ── Graph builder ───────────────────────────────────────────────

/// Fluent builder for test graphs. Nodes and edges keep insertion order.
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn trigger(self, id: &str, label: &str) -> Self {
        self.node(Node::new(id, NodeKind::Trigger).with_label(label))
    }

    pub fn script(self, id: &str, code: &str) -> Self {
        self.node(Node::new(id, NodeKind::Script).with_label(id).with_config("code", code))
    }

    pub fn condition(self, id: &str, expression: &str) -> Self {
        self.node(
            Node::new(id, NodeKind::Condition)
                .with_label(id)
                .with_config("expression", expression),
        )
    }

    pub fn output(self, id: &str, label: &str) -> Self {
        self.node(Node::new(id, NodeKind::Output).with_label(label))
    }

    pub fn agent(self, id: &str, role: &str, template: &str) -> Self {
        self.node(
            Node::new(id, NodeKind::Agent)
                .with_label(id)
                .with_config("role", role)
                .with_config("userPromptTemplate", template),
        )
    }

    pub fn request(self, id: &str, method: &str, url: &str) -> Self {
        self.node(
            Node::new(id, NodeKind::Request)
                .with_label(id)
                .with_config("method", method)
                .with_config("url", url),
        )
    }

    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge::new(source, target));
        self
    }

    pub fn branch(mut self, source: &str, handle: &str, target: &str) -> Self {
        self.edges.push(Edge::from_handle(source, handle, target));
        self
    }

    pub fn build(self) -> Graph {
        Graph::new(self.nodes, self.edges)
    }
}
