use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub leave_service: LeaveServiceConfig,
    pub retrieval: RetrievalConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LeaveServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    /// Upper bound on chunk size, in characters.
    pub chunk_max_chars: usize,
    /// Fraction of `chunk_max_chars` shared between adjacent chunks.
    pub chunk_overlap_fraction: f32,
    pub top_k: usize,
    /// Best-hit similarity below this is treated as ungrounded.
    pub grounding_threshold: f32,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Number of recent turns handed to the classifier and slot extractor.
    pub recent_turn_window: usize,
    /// Seconds a presented confirmation stays valid.
    pub confirmation_ttl_secs: u64,
    pub max_input_chars: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub embedding_base_url: Option<String>,
    pub embedding_api_key: Option<String>,
    pub leave_service_base_url: Option<String>,
    pub log_level: Option<String>,
    pub grounding_threshold: Option<f32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                base_url: "http://localhost:11434/v1".to_string(),
                api_key: None,
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            embedding: EmbeddingConfig {
                base_url: "http://localhost:11434/v1".to_string(),
                api_key: None,
                model: "nomic-embed-text".to_string(),
                timeout_secs: 30,
            },
            leave_service: LeaveServiceConfig {
                base_url: "http://localhost:9400".to_string(),
                timeout_secs: 10,
            },
            retrieval: RetrievalConfig {
                chunk_max_chars: 1000,
                chunk_overlap_fraction: 0.2,
                top_k: 3,
                grounding_threshold: 0.35,
            },
            session: SessionConfig {
                recent_turn_window: 10,
                confirmation_ttl_secs: 300,
                max_input_chars: 2000,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    embedding: Option<EmbeddingPatch>,
    leave_service: Option<LeaveServicePatch>,
    retrieval: Option<RetrievalPatch>,
    session: Option<SessionPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LeaveServicePatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    chunk_max_chars: Option<usize>,
    chunk_overlap_fraction: Option<f32>,
    top_k: Option<usize>,
    grounding_threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    recent_turn_window: Option<usize>,
    confirmation_ttl_secs: Option<u64>,
    max_input_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("hrdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(embedding) = patch.embedding {
            if let Some(base_url) = embedding.base_url {
                self.embedding.base_url = base_url;
            }
            if let Some(api_key) = embedding.api_key {
                self.embedding.api_key = Some(api_key.into());
            }
            if let Some(model) = embedding.model {
                self.embedding.model = model;
            }
            if let Some(timeout_secs) = embedding.timeout_secs {
                self.embedding.timeout_secs = timeout_secs;
            }
        }

        if let Some(leave_service) = patch.leave_service {
            if let Some(base_url) = leave_service.base_url {
                self.leave_service.base_url = base_url;
            }
            if let Some(timeout_secs) = leave_service.timeout_secs {
                self.leave_service.timeout_secs = timeout_secs;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(chunk_max_chars) = retrieval.chunk_max_chars {
                self.retrieval.chunk_max_chars = chunk_max_chars;
            }
            if let Some(chunk_overlap_fraction) = retrieval.chunk_overlap_fraction {
                self.retrieval.chunk_overlap_fraction = chunk_overlap_fraction;
            }
            if let Some(top_k) = retrieval.top_k {
                self.retrieval.top_k = top_k;
            }
            if let Some(grounding_threshold) = retrieval.grounding_threshold {
                self.retrieval.grounding_threshold = grounding_threshold;
            }
        }

        if let Some(session) = patch.session {
            if let Some(recent_turn_window) = session.recent_turn_window {
                self.session.recent_turn_window = recent_turn_window;
            }
            if let Some(confirmation_ttl_secs) = session.confirmation_ttl_secs {
                self.session.confirmation_ttl_secs = confirmation_ttl_secs;
            }
            if let Some(max_input_chars) = session.max_input_chars {
                self.session.max_input_chars = max_input_chars;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("HRDESK_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Ok(value) = env::var("HRDESK_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Ok(value) = env::var("HRDESK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Ok(value) = env::var("HRDESK_EMBEDDING_BASE_URL") {
            self.embedding.base_url = value;
        }
        if let Ok(value) = env::var("HRDESK_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(value.into());
        }
        if let Ok(value) = env::var("HRDESK_LEAVE_SERVICE_BASE_URL") {
            self.leave_service.base_url = value;
        }
        if let Ok(value) = env::var("HRDESK_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Ok(value) = env::var("HRDESK_LOG_FORMAT") {
            self.logging.format = value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "HRDESK_LOG_FORMAT".to_string(),
                value,
            })?;
        }
        if let Ok(value) = env::var("HRDESK_GROUNDING_THRESHOLD") {
            self.retrieval.grounding_threshold =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "HRDESK_GROUNDING_THRESHOLD".to_string(),
                    value,
                })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(value) = overrides.llm_base_url {
            self.llm.base_url = value;
        }
        if let Some(value) = overrides.llm_api_key {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = overrides.llm_model {
            self.llm.model = value;
        }
        if let Some(value) = overrides.embedding_base_url {
            self.embedding.base_url = value;
        }
        if let Some(value) = overrides.embedding_api_key {
            self.embedding.api_key = Some(value.into());
        }
        if let Some(value) = overrides.leave_service_base_url {
            self.leave_service.base_url = value;
        }
        if let Some(value) = overrides.log_level {
            self.logging.level = value;
        }
        if let Some(value) = overrides.grounding_threshold {
            self.retrieval.grounding_threshold = value;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("llm.base_url must not be empty".to_string()));
        }
        if self.embedding.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "embedding.base_url must not be empty".to_string(),
            ));
        }
        if self.leave_service.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "leave_service.base_url must not be empty".to_string(),
            ));
        }
        if self.retrieval.chunk_max_chars < 100 {
            return Err(ConfigError::Validation(
                "retrieval.chunk_max_chars must be at least 100".to_string(),
            ));
        }
        if !(0.0..0.9).contains(&self.retrieval.chunk_overlap_fraction) {
            return Err(ConfigError::Validation(
                "retrieval.chunk_overlap_fraction must be in [0.0, 0.9)".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Validation("retrieval.top_k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.grounding_threshold) {
            return Err(ConfigError::Validation(
                "retrieval.grounding_threshold must be in [0.0, 1.0]".to_string(),
            ));
        }
        if self.session.recent_turn_window == 0 {
            return Err(ConfigError::Validation(
                "session.recent_turn_window must be at least 1".to_string(),
            ));
        }
        if self.session.max_input_chars == 0 {
            return Err(ConfigError::Validation(
                "session.max_input_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Ok(env_path) = env::var("HRDESK_CONFIG") {
        let path = PathBuf::from(env_path);
        return path.exists().then_some(path);
    }
    let default = PathBuf::from("hrdesk.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_validate_cleanly() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.chunk_max_chars, 1000);
        assert_eq!(config.session.confirmation_ttl_secs, 300);
    }

    #[test]
    fn toml_file_patches_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[llm]
model = "gpt-4o-mini"

[retrieval]
top_k = 5
grounding_threshold = 0.5

[logging]
level = "debug"
format = "json"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load should succeed");

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.logging.format, LogFormat::Json);
        // untouched sections keep defaults
        assert_eq!(config.leave_service.timeout_secs, 10);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("/nonexistent/hrdesk.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn programmatic_overrides_win_over_defaults() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_model: Some("mistral".to_string()),
                grounding_threshold: Some(0.6),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load should succeed");

        assert_eq!(config.llm.model, "mistral");
        assert!((config.retrieval.grounding_threshold - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn out_of_range_overlap_fraction_fails_validation() {
        let mut config = AppConfig::default();
        config.retrieval.chunk_overlap_fraction = 0.95;
        let error = config.validate().expect_err("overlap fraction out of range");
        assert!(matches!(error, ConfigError::Validation(_)));
    }
}
