//! Configuration management for Surecast

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatcher::RetryPolicy;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub composio: Option<ComposioConfig>,
    pub twitter: Option<TwitterConfig>,
    pub telegram: Option<TelegramConfig>,
    pub linkedin: Option<LinkedInConfig>,
    pub research: Option<ResearchConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per slot under `data_dir`
    #[default]
    File,
    /// SQLite database at `database`
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// SQLite path, only used by the sqlite backend
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: default_data_dir(),
            database: default_database(),
        }
    }
}

impl StorageConfig {
    pub fn expand_data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    pub fn expand_database_path(&self) -> String {
        shellexpand::tilde(&self.database).to_string()
    }
}

fn default_data_dir() -> String {
    "~/.local/share/surecast".to_string()
}

fn default_database() -> String {
    "~/.local/share/surecast/surecast.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_increment")]
    pub increment_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
            increment_secs: default_increment(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts.max(1),
            Duration::from_secs(self.base_delay_secs),
            Duration::from_secs(self.increment_secs),
        )
    }
}

fn default_max_attempts() -> u32 {
    2
}

fn default_base_delay() -> u64 {
    1
}

fn default_increment() -> u64 {
    2
}

/// Shared credentials for the Composio tool-execution gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposioConfig {
    pub api_key: String,
    pub user_id: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    pub enabled: bool,
    pub connected_account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    /// Chat for primary publishing on the Telegram channel
    pub chat_id: Option<String>,
    /// Chat that receives fallback copies of failed posts
    pub fallback_chat: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInConfig {
    pub enabled: bool,
    pub connected_account_id: String,
    #[serde(default = "default_visibility")]
    pub visibility: String,
}

fn default_visibility() -> String {
    "PUBLIC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub firecrawl_api_key: String,
    pub base_url: Option<String>,
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: i64,
    #[serde(default = "default_pacing_secs")]
    pub pacing_secs: u64,
}

fn default_sources() -> Vec<String> {
    vec![
        "https://yieldbot.cc".to_string(),
        "https://coinmarketcap.com/trending-cryptocurrencies/".to_string(),
        "https://www.coingecko.com/en/highlights/trending-crypto".to_string(),
        "https://www.coindesk.com/markets/".to_string(),
        "https://www.theblock.co/latest".to_string(),
    ]
}

fn default_freshness_hours() -> i64 {
    24
}

/// Longest accepted research freshness window, one leap year
pub const MAX_FRESHNESS_HOURS: i64 = 24 * 366;

impl ResearchConfig {
    /// The freshness window, rejected unless within 1..=[`MAX_FRESHNESS_HOURS`]
    pub fn freshness(&self) -> Result<TimeDelta> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            field: "research.freshness_hours".to_string(),
            reason,
        };
        if !(1..=MAX_FRESHNESS_HOURS).contains(&self.freshness_hours) {
            return Err(invalid(format!(
                "must be between 1 and {}, got {}",
                MAX_FRESHNESS_HOURS, self.freshness_hours
            ))
            .into());
        }
        TimeDelta::try_hours(self.freshness_hours)
            .ok_or_else(|| invalid("out of range".to_string()).into())
    }
}

fn default_pacing_secs() -> u64 {
    1
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make the pipeline unusable
    pub fn validate(&self) -> Result<()> {
        let twitter_on = self.twitter.as_ref().is_some_and(|t| t.enabled);
        let linkedin_on = self.linkedin.as_ref().is_some_and(|l| l.enabled);
        if (twitter_on || linkedin_on) && self.composio.is_none() {
            return Err(ConfigError::MissingField("composio".to_string()).into());
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if let Some(research) = &self.research {
            research.freshness()?;
        }
        Ok(())
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig::default(),
            retry: RetryConfig::default(),
            composio: None,
            twitter: None,
            telegram: None,
            linkedin: None,
            research: None,
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SURECAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("surecast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("surecast"))
}
