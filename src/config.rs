//! Runtime configuration, loaded from the environment.
//!
//! `dotenvy` is invoked by the binary before `Config::from_env`; the
//! library never touches `.env` files itself.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Configuration for the model client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API credential. Absent means the tool loop cannot run.
    pub api_key: Option<SecretString>,
    /// Service base URL.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Output token budget per call.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the persisted memory databases.
    pub data_dir: PathBuf,
    /// Host directory mounted read-only into every session.
    pub skills_dir: Option<PathBuf>,
    /// Image tag for container sessions.
    pub sandbox_image: String,
    /// Path to the VM helper executable.
    pub vm_helper: PathBuf,
    /// Default per-command execution timeout.
    pub exec_timeout: Duration,
    /// Memory store flush interval.
    pub flush_interval: Duration,
    /// Model client configuration.
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("solace");
        Self {
            data_dir,
            skills_dir: None,
            sandbox_image: "solace-session:latest".to_string(),
            vm_helper: PathBuf::from("solace-vm-helper"),
            exec_timeout: Duration::from_secs(30),
            flush_interval: Duration::from_secs(60),
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    /// Build configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("SOLACE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("SOLACE_SKILLS_DIR") {
            config.skills_dir = Some(PathBuf::from(dir));
        }
        if let Ok(image) = std::env::var("SOLACE_SANDBOX_IMAGE") {
            config.sandbox_image = image;
        }
        if let Ok(helper) = std::env::var("SOLACE_VM_HELPER") {
            config.vm_helper = PathBuf::from(helper);
        }
        if let Ok(secs) = std::env::var("SOLACE_EXEC_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.exec_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(secs) = std::env::var("SOLACE_FLUSH_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.flush_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.is_empty() {
                config.llm.api_key = Some(SecretString::from(key));
            }
        }
        if let Ok(url) = std::env::var("SOLACE_LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("SOLACE_LLM_MODEL") {
            config.llm.model = model;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.exec_timeout, Duration::from_secs(30));
        assert_eq!(config.flush_interval, Duration::from_secs(60));
        assert!(config.llm.api_key.is_none());
        assert!(config.data_dir.ends_with("solace"));
    }
}
