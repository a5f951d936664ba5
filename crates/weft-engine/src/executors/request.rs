use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use weft_core::error::{Result, WeftError};
use weft_core::graph::{NodeKind, RequestConfig};
use weft_core::traits::HttpTransport;
use weft_core::types::{HttpRequest, LogLevel};

use super::{non_blank, NodeCall, NodeExecutor};

/// Issues the configured HTTP call and parses the response as JSON.
pub struct RequestExecutor {
    http: Arc<dyn HttpTransport>,
}

impl RequestExecutor {
    pub fn new(http: Arc<dyn HttpTransport>) -> Self {
        Self { http }
    }
}

/// Turn the node config into a transport request.
///
/// The body is only sent for methods that carry one and must be valid JSON.
fn build_request(config: RequestConfig) -> Result<HttpRequest> {
    let url = non_blank(config.url)
        .ok_or_else(|| WeftError::missing_field(NodeKind::Request.as_str(), "url"))?;

    let method = match config.method.trim() {
        "" => "GET".to_string(),
        m => m.to_ascii_uppercase(),
    };

    let body = match non_blank(config.body) {
        Some(raw) if method != "GET" && method != "HEAD" => Some(
            serde_json::from_str::<Value>(&raw)
                .map_err(|e| WeftError::InvalidRequest(format!("body is not valid JSON: {}", e)))?,
        ),
        _ => None,
    };

    let mut headers = config.headers;
    let has_content_type = headers
        .keys()
        .any(|k| k.eq_ignore_ascii_case("content-type"));
    if body.is_some() && !has_content_type {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }

    Ok(HttpRequest {
        method,
        url,
        headers,
        body,
    })
}

impl NodeExecutor for RequestExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Request
    }

    fn execute<'a>(&'a self, call: NodeCall<'a>) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let request = build_request(call.node.config()?)?;
            let url = request.url.clone();

            call.tracker.node_log(
                call.node,
                LogLevel::Info,
                format!("{} {}", request.method, request.url),
            );

            let response = self.http.send(request).await?;

            if !response.is_success() {
                call.tracker.node_log(
                    call.node,
                    LogLevel::Warn,
                    format!("HTTP {} from {}", response.status, url),
                );
            }

            serde_json::from_str::<Value>(&response.body).map_err(|e| {
                WeftError::Http(format!("response from {} is not JSON: {}", url, e))
            })
        })
    }
}
