use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use hrdesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: Option<&str>| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "llm.base_url",
        &config.llm.base_url,
        source("llm.base_url", Some("HRDESK_LLM_BASE_URL")),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", Some("HRDESK_LLM_MODEL")),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", Some("HRDESK_LLM_API_KEY")),
    ));

    lines.push(render_line(
        "embedding.base_url",
        &config.embedding.base_url,
        source("embedding.base_url", Some("HRDESK_EMBEDDING_BASE_URL")),
    ));
    lines.push(render_line(
        "embedding.model",
        &config.embedding.model,
        source("embedding.model", None),
    ));
    let embedding_api_key =
        if config.embedding.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "embedding.api_key",
        embedding_api_key,
        source("embedding.api_key", Some("HRDESK_EMBEDDING_API_KEY")),
    ));

    lines.push(render_line(
        "leave_service.base_url",
        &config.leave_service.base_url,
        source("leave_service.base_url", Some("HRDESK_LEAVE_SERVICE_BASE_URL")),
    ));

    lines.push(render_line(
        "retrieval.top_k",
        &config.retrieval.top_k.to_string(),
        source("retrieval.top_k", None),
    ));
    lines.push(render_line(
        "retrieval.grounding_threshold",
        &config.retrieval.grounding_threshold.to_string(),
        source("retrieval.grounding_threshold", Some("HRDESK_GROUNDING_THRESHOLD")),
    ));
    lines.push(render_line(
        "session.confirmation_ttl_secs",
        &config.session.confirmation_ttl_secs.to_string(),
        source("session.confirmation_ttl_secs", None),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", None),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", None),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", Some("HRDESK_LOG_LEVEL")),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", Some("HRDESK_LOG_FORMAT")),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    if let Ok(env_path) = env::var("HRDESK_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Some(path);
        }
    }

    let root = PathBuf::from("hrdesk.toml");
    root.exists().then_some(root)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(doc: &Value, key_path: &str) -> bool {
    let mut current = doc;
    for segment in key_path.split('.') {
        match current.get(segment) {
            Some(value) => current = value,
            None => return false,
        }
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} [{source}]")
}
