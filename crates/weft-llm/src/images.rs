use std::collections::HashMap;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use weft_core::config::ImageConfig;
use weft_core::error::{Result, WeftError};
use weft_core::traits::ImageGenerator;
use weft_core::types::{GeneratedImage, ImageRequest};

use crate::providers::presets::{build_extra_headers, get_preset};

/// OpenAI-compatible `/images/generations` client.
///
/// `provider` picks the endpoint and headers from the same presets the chat
/// client uses; an explicit `base_url` overrides the preset URL.
pub struct OpenAiImageClient {
    http: Client,
    config: ImageConfig,
}

impl OpenAiImageClient {
    pub fn new(config: ImageConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct ImagesRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u8,
}

#[derive(Deserialize, Debug)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize, Debug)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

/// Resolved target of an image request.
#[derive(Debug)]
struct Endpoint {
    url: String,
    headers: HashMap<String, String>,
}

fn endpoint(config: &ImageConfig) -> Result<Endpoint> {
    let preset = get_preset(&config.provider);

    if let Some(preset) = &preset {
        if preset.needs_api_key && config.api_key.is_none() {
            return Err(WeftError::ImageGeneration(format!(
                "provider '{}' has no api_key configured",
                config.provider
            )));
        }
    }

    let url = match (&config.base_url, &preset) {
        (Some(url), _) => url.clone(),
        (None, Some(preset)) => images_url(preset.default_base_url),
        (None, None) => {
            return Err(WeftError::ImageGeneration(format!(
                "provider '{}' needs a base_url",
                config.provider
            )))
        }
    };

    let headers = preset
        .map(|preset| build_extra_headers(&preset, &HashMap::new()))
        .unwrap_or_default();

    Ok(Endpoint { url, headers })
}

/// Presets carry chat URLs; images live next to them.
fn images_url(chat_url: &str) -> String {
    match chat_url.strip_suffix("chat/completions") {
        Some(root) => format!("{}images/generations", root),
        None => format!("{}/images/generations", chat_url.trim_end_matches('/')),
    }
}

/// Pick the first image; inline payloads become `data:` URIs.
fn parse_images_response(body: &str) -> Result<GeneratedImage> {
    let parsed: ImagesResponse =
        serde_json::from_str(body).map_err(|e| WeftError::ImageGeneration(e.to_string()))?;

    let first = parsed
        .data
        .into_iter()
        .next()
        .ok_or_else(|| WeftError::ImageGeneration("provider returned no images".to_string()))?;

    let reference = match (first.url, first.b64_json) {
        (Some(url), _) => url,
        (None, Some(b64)) => format!("data:image/png;base64,{}", b64),
        (None, None) => {
            return Err(WeftError::ImageGeneration(
                "image entry has neither url nor b64_json".to_string(),
            ))
        }
    };

    Ok(GeneratedImage {
        reference,
        revised_prompt: first.revised_prompt,
    })
}

impl ImageGenerator for OpenAiImageClient {
    fn generate(&self, request: ImageRequest) -> BoxFuture<'_, Result<GeneratedImage>> {
        Box::pin(async move {
            let endpoint = endpoint(&self.config)?;
            let model = request.model.as_deref().unwrap_or(&self.config.model_id);

            let body = ImagesRequest {
                model,
                prompt: &request.prompt,
                size: &request.size,
                n: 1,
            };

            debug!(
                provider = %self.config.provider,
                model,
                size = %request.size,
                "Requesting image generation"
            );

            let mut req = self.http.post(&endpoint.url).json(&body);
            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
            for (k, v) in &endpoint.headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let response = req
                .send()
                .await
                .map_err(|e| WeftError::ImageGeneration(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| WeftError::ImageGeneration(e.to_string()))?;

            if !status.is_success() {
                return Err(WeftError::ImageGeneration(format!("HTTP {}: {}", status, text)));
            }

            parse_images_response(&text)
        })
    }
}
