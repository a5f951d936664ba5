use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Method};
use tracing::debug;

use weft_core::config::HttpConfig;
use weft_core::error::{Result, WeftError};
use weft_core::traits::HttpTransport;
use weft_core::types::{HttpRequest, HttpResponse};

/// `HttpTransport` over a shared reqwest client.
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| WeftError::Http(e.to_string()))?;
        Ok(Self { http })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
                WeftError::InvalidRequest(format!("unsupported method '{}'", request.method))
            })?;

            let mut req = self.http.request(method, &request.url);
            for (k, v) in &request.headers {
                req = req.header(k.as_str(), v.as_str());
            }
            if let Some(body) = &request.body {
                req = req.body(body.to_string());
            }

            let response = req
                .send()
                .await
                .map_err(|e| WeftError::Http(e.to_string()))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| WeftError::Http(e.to_string()))?;

            debug!(url = %request.url, status, bytes = body.len(), "HTTP response");
            Ok(HttpResponse { status, body })
        })
    }
}
