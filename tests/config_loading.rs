use std::io::Write;

use weft_core::config::AppConfig;
use weft_core::error::WeftError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
max_steps = 20
legacy_delay_ms = 250
default_delay_ms = 500

[engine.script]
max_operations = 5000

[model]
provider = "lmstudio"
model_id = "qwen2.5-7b-instruct"
base_url = "http://localhost:1234/v1"
max_tokens = 2048
temperature = 0.2

[providers.groq]
api_key = "gsk-test"

[image]
model_id = "dall-e-2"
api_key = "sk-image"

[http]
timeout_secs = 5
user_agent = "weft-test"

[log]
log_dir = "/tmp/weft-runs"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_steps, 20);
    assert_eq!(config.engine.legacy_delay_ms, 250);
    assert_eq!(config.engine.default_delay_ms, 500);
    assert_eq!(config.engine.event_capacity, 256);
    assert_eq!(config.engine.script.max_operations, 5000);
    assert_eq!(config.engine.script.max_call_levels, 32);

    let model = config.model.expect("model present");
    assert_eq!(model.provider, "lmstudio");
    assert_eq!(model.model_id, "qwen2.5-7b-instruct");
    assert_eq!(model.base_url.as_deref(), Some("http://localhost:1234/v1"));
    assert_eq!(model.max_tokens, 2048);

    assert_eq!(
        config.providers["groq"].api_key.as_deref(),
        Some("gsk-test")
    );

    let image = config.image.expect("image present");
    assert_eq!(image.provider, "openai");
    assert_eq!(image.model_id, "dall-e-2");

    assert_eq!(config.http.timeout_secs, 5);
    assert_eq!(config.http.user_agent, "weft-test");
    assert_eq!(
        config.log.expect("log present").resolved_dir(),
        std::path::PathBuf::from("/tmp/weft-runs")
    );
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("WEFT_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${WEFT_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.model.unwrap().api_key,
        Some("expanded-key-value".to_string())
    );

    std::env::remove_var("WEFT_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "llama3.2"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_steps, 50);
    assert_eq!(config.engine.default_delay_ms, 1000);
    assert_eq!(config.http.timeout_secs, 30);
    assert!(config.providers.is_empty());
    assert!(config.image.is_none());
    assert!(config.log.is_none());
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, WeftError::ConfigNotFound(_)));
}

#[test]
fn test_zero_step_ceiling_is_rejected() {
    let toml_content = r#"
[engine]
max_steps = 0
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, WeftError::Config(_)));
}
