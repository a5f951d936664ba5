//! Model resolution for agent nodes.
//!
//! Agent nodes name a model either as a bare id (`gpt-4o-mini`), which runs
//! on the active provider from `[model]`, or as `provider:model`
//! (`lmstudio:qwen/qwen3-vl-8b`), which runs on a provider from
//! `[providers.*]`, the active provider, or a keyless local preset.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use weft_core::config::{AppConfig, ModelConfig, ProviderConfig};
use weft_core::error::{Result, WeftError};
use weft_core::traits::{LlmClient, ModelResolver, ResolvedModel};

use crate::providers::openai::OpenAiClient;
use crate::providers::presets::{build_extra_headers, get_preset};

/// Resolves model ids against the configured providers.
pub struct ProviderRegistry {
    active: Option<ModelConfig>,
    providers: HashMap<String, ProviderConfig>,
    client: Arc<dyn LlmClient>,
}

impl ProviderRegistry {
    pub fn new(active: Option<ModelConfig>, providers: HashMap<String, ProviderConfig>) -> Self {
        Self {
            active,
            providers,
            client: Arc::new(OpenAiClient::new()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.model.clone(), config.providers.clone())
    }

    /// Replace the transport used for every resolved model.
    pub fn with_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = client;
        self
    }

    /// The active provider name, if one is configured.
    pub fn active_provider(&self) -> Option<&str> {
        self.active.as_ref().map(|m| m.provider.as_str())
    }

    fn is_known_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
            || self.active_provider() == Some(name)
            || get_preset(name).is_some_and(|p| !p.needs_api_key)
    }

    fn config_for(&self, provider: &str, model_id: &str) -> ModelConfig {
        if let Some(named) = self.providers.get(provider) {
            let mut config = ModelConfig::new(provider, model_id);
            config.api_key = named.api_key.clone();
            config.base_url = named.base_url.clone();
            config.extra_headers = named.extra_headers.clone();
            if let Some(active) = &self.active {
                config.max_tokens = active.max_tokens;
                config.temperature = active.temperature;
            }
            return config;
        }

        match &self.active {
            Some(active) if active.provider == provider => {
                let mut config = active.clone();
                config.model_id = model_id.to_string();
                config
            }
            _ => ModelConfig::new(provider, model_id),
        }
    }

    fn finish(&self, mut config: ModelConfig) -> Result<ResolvedModel> {
        if config.provider == "anthropic" || config.provider == "claude" {
            return Err(WeftError::UnsupportedProvider(format!(
                "{} (only OpenAI-compatible endpoints are supported)",
                config.provider
            )));
        }

        if let Some(preset) = get_preset(&config.provider) {
            if config.base_url.is_none() {
                config.base_url = Some(preset.default_base_url.to_string());
            }
            config.extra_headers = build_extra_headers(&preset, &config.extra_headers);
            if preset.needs_api_key && config.api_key.is_none() {
                return Err(WeftError::NoActiveProvider(format!(
                    "provider '{}' has no api_key configured",
                    config.provider
                )));
            }
        } else if config.base_url.is_none() {
            return Err(WeftError::NoActiveProvider(format!(
                "provider '{}' needs a base_url",
                config.provider
            )));
        }

        debug!(provider = %config.provider, model = %config.model_id, "Resolved model");

        Ok(ResolvedModel {
            client: self.client.clone(),
            config,
        })
    }
}

impl ModelResolver for ProviderRegistry {
    fn resolve(&self, model: Option<&str>) -> Result<ResolvedModel> {
        let requested = model.map(str::trim).filter(|m| !m.is_empty());

        // `provider:model`, but only when the prefix names a provider we
        // know; Ollama-style ids such as `llama3:8b` stay whole.
        if let Some((provider, model_id)) = requested.and_then(|m| m.split_once(':')) {
            if !model_id.is_empty() && self.is_known_provider(provider) {
                return self.finish(self.config_for(provider, model_id));
            }
        }

        let active = self.active.as_ref().ok_or_else(|| {
            WeftError::NoActiveProvider(
                "no active provider configured; add a [model] section or use a provider:model id"
                    .to_string(),
            )
        })?;

        let mut config = active.clone();
        if let Some(model_id) = requested {
            config.model_id = model_id.to_string();
        }
        self.finish(config)
    }
}
