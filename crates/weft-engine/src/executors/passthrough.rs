//! Nodes that need no external capability: trigger, output, delay, and the
//! fallback for legacy node types.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use weft_core::error::Result;
use weft_core::graph::{DelayConfig, NodeKind};
use weft_core::types::LogLevel;

use super::{NodeCall, NodeExecutor};

pub const DELAY_COMPLETE: &str = "delay-complete";

/// Graph root. Emits its label.
pub struct TriggerExecutor;

impl NodeExecutor for TriggerExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Trigger
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        let label = call.node.label().to_string();
        Box::pin(async move { Ok(Value::String(label)) })
    }
}

/// Captures its input as the run's final result.
pub struct OutputExecutor;

impl NodeExecutor for OutputExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Output
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move { Ok(call.input) })
    }
}

/// Suspends for the configured number of milliseconds.
pub struct DelayExecutor {
    default_ms: u64,
}

impl DelayExecutor {
    pub fn new(default_ms: u64) -> Self {
        Self { default_ms }
    }
}

impl NodeExecutor for DelayExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Delay
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let config: DelayConfig = call.node.config()?;
            let ms = config.millis().unwrap_or(self.default_ms);

            call.tracker
                .node_log(call.node, LogLevel::Info, format!("Waiting {} ms", ms));
            tokio::time::sleep(Duration::from_millis(ms)).await;

            Ok(Value::String(DELAY_COMPLETE.to_string()))
        })
    }
}

/// Unknown or legacy node types: a fixed short pause, then the label.
pub struct LegacyExecutor {
    delay_ms: u64,
}

impl LegacyExecutor {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl NodeExecutor for LegacyExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Default
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        let label = call.node.label().to_string();
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(Value::String(label))
        })
    }
}
