use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rebaser_kernel::{INITIAL_QUERY_TEMPLATE, PLAN_INSTRUCTIONS};
use serde::Deserialize;
use thiserror::Error;

use crate::planner::RetryPolicy;

mod load;

pub use load::{
    API_KEY_ENV, MODEL_ENV, base_config_dir, global_config_path, load_config, load_layer_from_path,
    load_layer_from_str, project_config_path,
};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
    #[error("no API key found; set {0}")]
    MissingApiKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    pub model: String,
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub api_key: Option<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key_env: API_KEY_ENV.to_string(),
            api_key: None,
        }
    }
}

impl PlannerConfig {
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.api_key_env.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_unit_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_unit_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptsConfig {
    pub instruction_file: Option<PathBuf>,
    pub initial_query_file: Option<PathBuf>,
}

impl PromptsConfig {
    /// Plan-generation instructions: the configured file, or the built-in prompt.
    pub fn instructions(&self) -> Result<String, ConfigError> {
        read_or(self.instruction_file.as_deref(), PLAN_INSTRUCTIONS)
    }

    pub fn initial_query_template(&self) -> Result<String, ConfigError> {
        read_or(self.initial_query_file.as_deref(), INITIAL_QUERY_TEMPLATE)
    }
}

fn read_or(path: Option<&Path>, fallback: &str) -> Result<String, ConfigError> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        }),
        None => Ok(fallback.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Paths whose patches never reach the planner.
    pub elide_paths: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            elide_paths: ["uv.lock", "Cargo.lock", "package-lock.json", "yarn.lock"]
                .iter()
                .map(|path| path.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Directory for agent transcripts. Relative paths are taken from the repository root.
    pub transcript_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub planner: PlannerConfig,
    pub retry: RetryConfig,
    pub prompts: PromptsConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

/// One config file's worth of settings. Absent keys leave lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub planner: PlannerLayer,
    #[serde(default)]
    pub retry: RetryLayer,
    #[serde(default)]
    pub prompts: PromptsLayer,
    #[serde(default)]
    pub history: HistoryLayer,
    #[serde(default)]
    pub logging: LoggingLayer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerLayer {
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryLayer {
    pub max_attempts: Option<u32>,
    pub backoff_unit_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptsLayer {
    pub instruction_file: Option<PathBuf>,
    pub initial_query_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryLayer {
    pub elide_paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingLayer {
    pub transcript_dir: Option<PathBuf>,
}

impl PlannerConfig {
    fn apply_layer(&mut self, layer: &PlannerLayer) {
        if let Some(model) = layer.model.as_ref() {
            self.model = model.clone();
        }
        if let Some(endpoint) = layer.endpoint.as_ref() {
            self.endpoint = endpoint.clone();
        }
        if let Some(api_key_env) = layer.api_key_env.as_ref() {
            self.api_key_env = api_key_env.clone();
        }
    }
}

impl RetryConfig {
    fn apply_layer(&mut self, layer: &RetryLayer) {
        if let Some(max_attempts) = layer.max_attempts {
            self.max_attempts = max_attempts;
        }
        if let Some(backoff_unit_ms) = layer.backoff_unit_ms {
            self.backoff_unit_ms = backoff_unit_ms;
        }
    }
}

impl PromptsConfig {
    fn apply_layer(&mut self, layer: &PromptsLayer) {
        if let Some(path) = layer.instruction_file.as_ref() {
            self.instruction_file = Some(path.clone());
        }
        if let Some(path) = layer.initial_query_file.as_ref() {
            self.initial_query_file = Some(path.clone());
        }
    }
}

impl Config {
    pub fn from_layers(layers: &[ConfigLayer]) -> Self {
        let mut config = Config::default();
        for layer in layers {
            config.apply_layer(layer);
        }
        config
    }

    pub fn apply_layer(&mut self, layer: &ConfigLayer) {
        self.planner.apply_layer(&layer.planner);
        self.retry.apply_layer(&layer.retry);
        self.prompts.apply_layer(&layer.prompts);
        if let Some(paths) = layer.history.elide_paths.as_ref() {
            self.history.elide_paths = paths.clone();
        }
        if let Some(dir) = layer.logging.transcript_dir.as_ref() {
            self.logging.transcript_dir = Some(dir.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.planner.model.trim().is_empty() {
            return Err(ConfigError::Invalid("planner.model cannot be empty".to_string()));
        }
        if self.planner.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "planner.endpoint cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
