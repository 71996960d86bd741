use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Durable client-side storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Page sizes used when listing collections
    #[serde(default)]
    pub paging: PagingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_credential_path")]
    pub credential_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    #[serde(default = "default_journal_page_size")]
    pub journal_page_size: u32,
    #[serde(default = "default_plan_page_size")]
    pub plan_page_size: u32,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_credential_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".zenjournal").join("token"),
        None => PathBuf::from(".zenjournal").join("token"),
    }
}

fn default_journal_page_size() -> u32 {
    20
}

fn default_plan_page_size() -> u32 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credential_path: default_credential_path(),
        }
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            journal_page_size: default_journal_page_size(),
            plan_page_size: default_plan_page_size(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(base_url = %config.api.base_url, "configuration loaded");
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: ClientConfig = toml::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Apply `ZENJOURNAL_*` environment overrides on top of the loaded values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ZENJOURNAL_API_URL") {
            self.api.base_url = url;
        }
        if let Some(timeout) = lookup("ZENJOURNAL_TIMEOUT_SECS") {
            self.api.timeout_secs = timeout.parse().map_err(|_| {
                ConfigError::Invalid(format!("ZENJOURNAL_TIMEOUT_SECS is not a number: {}", timeout))
            })?;
        }
        if let Some(path) = lookup("ZENJOURNAL_CREDENTIAL_PATH") {
            self.storage.credential_path = PathBuf::from(path);
        }
        self.normalize();
        self.validate()
    }

    fn normalize(&mut self) {
        let trimmed = self.api.base_url.trim_end_matches('/').len();
        self.api.base_url.truncate(trimmed);
    }

    /// Check invariants the rest of the client relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.api.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api.base_url must start with http:// or https://, got '{}'",
                url
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be > 0".into()));
        }
        if self.paging.journal_page_size == 0 || self.paging.plan_page_size == 0 {
            return Err(ConfigError::Invalid("page sizes must be > 0".into()));
        }
        Ok(())
    }
}
