use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeftError};

/// Top-level Weft configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// The active provider. Absent means agent nodes without an explicit
    /// `provider:model` id fail with "no active provider".
    #[serde(default)]
    pub model: Option<ModelConfig>,
    /// Extra named providers, addressable as `<name>:<model>`.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub image: Option<ImageConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum node executions per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Sleep for nodes of unknown/legacy type.
    #[serde(default = "default_legacy_delay_ms")]
    pub legacy_delay_ms: u64,
    /// Delay node duration when none is configured.
    #[serde(default = "default_delay_ms")]
    pub default_delay_ms: u64,
    /// Broadcast buffer for run events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub script: ScriptLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            legacy_delay_ms: default_legacy_delay_ms(),
            default_delay_ms: default_delay_ms(),
            event_capacity: default_event_capacity(),
            script: ScriptLimits::default(),
        }
    }
}

fn default_max_steps() -> usize { 50 }
fn default_legacy_delay_ms() -> u64 { 1000 }
fn default_delay_ms() -> u64 { 1000 }
fn default_event_capacity() -> usize { 256 }

/// Sandbox limits for script and condition snippets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptLimits {
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,
    #[serde(default = "default_max_collection_size")]
    pub max_array_size: usize,
    #[serde(default = "default_max_collection_size")]
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            max_call_levels: default_max_call_levels(),
            max_string_size: default_max_string_size(),
            max_array_size: default_max_collection_size(),
            max_map_size: default_max_collection_size(),
        }
    }
}

fn default_max_operations() -> u64 { 100_000 }
fn default_max_call_levels() -> usize { 32 }
fn default_max_string_size() -> usize { 1_048_576 }
fn default_max_collection_size() -> usize { 10_000 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            extra_headers: HashMap::new(),
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.7 }

/// A named provider without a fixed model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_image_model")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_image_model() -> String { "dall-e-3".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout() -> u64 { 30 }
fn default_user_agent() -> String { format!("Weft/{}", env!("CARGO_PKG_VERSION")) }

/// JSONL run journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub log_dir: String,
}

impl LogConfig {
    /// Resolve the journal directory (expand ~).
    pub fn resolved_dir(&self) -> PathBuf {
        if let Some(rest) = self.log_dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.log_dir)
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WeftError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn from_toml(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| WeftError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.engine.max_steps == 0 {
            return Err(WeftError::Config(
                "engine.max_steps must be at least 1".to_string(),
            ));
        }
        if let Some(model) = &self.model {
            if model.model_id.trim().is_empty() {
                return Err(WeftError::Config("model.model_id is empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay literal so the error points at them
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_WEFT_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_WEFT_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_WEFT_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_WEFT_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_WEFT_VAR}\"");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.engine.max_steps, 50);
        assert_eq!(config.engine.legacy_delay_ms, 1000);
        assert_eq!(config.engine.script.max_operations, 100_000);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.model.is_none());
        assert!(config.providers.is_empty());
        assert!(config.log.is_none());
    }

    #[test]
    fn test_model_defaults_from_minimal_toml() {
        let config = AppConfig::from_toml(
            r#"
[model]
model_id = "gpt-4o-mini"
"#,
        )
        .unwrap();
        let model = config.model.unwrap();
        assert_eq!(model.provider, "openai");
        assert_eq!(model.max_tokens, 4096);
        assert!(model.api_key.is_none());
    }

    #[test]
    fn test_named_providers() {
        let config = AppConfig::from_toml(
            r#"
[providers.lmstudio]
base_url = "http://localhost:1234/v1/chat/completions"

[providers.gemini]
api_key = "g-key"
"#,
        )
        .unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(
            config.providers["gemini"].api_key.as_deref(),
            Some("g-key")
        );
    }

    #[test]
    fn test_zero_max_steps_rejected() {
        let err = AppConfig::from_toml("[engine]\nmax_steps = 0\n").unwrap_err();
        assert!(matches!(err, WeftError::Config(_)));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[engine\nmax_steps = ").unwrap_err();
        assert!(matches!(err, WeftError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Path::new("/definitely/not/here/weft.toml")).unwrap_err();
        assert!(matches!(err, WeftError::ConfigNotFound(_)));
    }

    #[test]
    fn test_log_dir_expands_home() {
        let cfg = LogConfig {
            log_dir: "~/.weft/runs".into(),
        };
        if let Some(home) = dirs_home() {
            assert_eq!(cfg.resolved_dir(), home.join(".weft/runs"));
        }

        let absolute = LogConfig {
            log_dir: "/var/log/weft".into(),
        };
        assert_eq!(absolute.resolved_dir(), PathBuf::from("/var/log/weft"));
    }
}
