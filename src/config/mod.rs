//! Application configuration: model backend, agent limits and MCP servers.

pub mod mcp;
pub mod settings;

pub use mcp::{McpConfig, McpServerConfig, McpTransportKind};
pub use settings::Settings;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrideError};

/// Completion backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request timeout, separate from the agent retry budget.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            api_key: String::new(),
            model_name: "deepseek-reasoner".to_string(),
            temperature: 0.7,
            max_tokens: 8192,
            request_timeout_secs: 3600,
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| StrideError::Configuration(format!("llm base_url '{}': {e}", self.base_url)))?;
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(StrideError::Configuration(format!(
                "llm temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(StrideError::Configuration("llm request_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Agent loop limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Tool rounds per invocation, 1..=999.
    pub max_iterations: u32,
    /// Attempts per model or tool call, 2..=9.
    pub max_retries: u32,
    /// Results per search, 2..=29.
    pub max_search_results: u32,
    /// Fixed backoff between retries.
    pub retry_interval_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_retries: 3,
            max_search_results: 10,
            retry_interval_ms: 1000,
        }
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(StrideError::Configuration(format!(
            "agent {field} must be within {min}..={max}, got {value}"
        )))
    }
}

impl AgentConfig {
    /// Reject out-of-range values. Nothing is clamped.
    pub fn validate(&self) -> Result<()> {
        check_range("max_iterations", self.max_iterations, 1, 999)?;
        check_range("max_retries", self.max_retries, 2, 9)?;
        check_range("max_search_results", self.max_search_results, 2, 29)?;
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Whole application configuration, as stored in the YAML config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm_config: LlmConfig,
    #[serde(default)]
    pub agent_config: AgentConfig,
    #[serde(default)]
    pub mcp_config: McpConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.llm_config.validate()?;
        self.agent_config.validate()?;
        self.mcp_config.validate()
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| StrideError::Configuration(format!("invalid config YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| StrideError::Configuration(format!("cannot encode config: {e}")))
    }

    /// Replace the agent limits after validating them.
    pub fn update_agent_config(&mut self, agent_config: AgentConfig) -> Result<()> {
        agent_config.validate()?;
        self.agent_config = agent_config;
        Ok(())
    }

    /// Replace the model settings after validating them.
    pub fn update_llm_config(&mut self, llm_config: LlmConfig) -> Result<()> {
        llm_config.validate()?;
        self.llm_config = llm_config;
        Ok(())
    }

    /// Replace the MCP server table after validating it.
    pub fn update_mcp_config(&mut self, mcp_config: McpConfig) -> Result<()> {
        mcp_config.validate()?;
        self.mcp_config = mcp_config;
        Ok(())
    }
}

/// YAML file holding an [`AppConfig`].
#[derive(Debug, Clone)]
pub struct FileConfigRepository {
    path: PathBuf,
}

impl FileConfigRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config, writing the defaults first if the file is missing.
    pub fn load(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "config file missing, writing defaults");
            self.save(&AppConfig::default())?;
        }
        let text = std::fs::read_to_string(&self.path)?;
        AppConfig::from_yaml(&text)
    }

    /// Validate and persist. Writes a sibling temp file, then renames it over
    /// the target so readers never see a partial document.
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("yaml.tmp");
        std::fs::write(&tmp, config.to_yaml()?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
