//! Configuration loading and management
//!
//! Configuration is organized into two tiers:
//! 1. User-configurable settings (delays, retries, research knobs)
//! 2. Hidden/Advanced settings (endpoints and wizard URLs, config file only)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub user: UserConfig,
    pub advanced: AdvancedConfig,
}

/// Settings a user is expected to tune
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Delay between consecutive items in a batch, milliseconds
    pub item_stagger_ms: u64,

    /// Retries for a recoverable wizard step before the item fails
    pub step_retry_count: u32,

    /// Delay between wizard step retries, milliseconds
    pub step_retry_delay_ms: u64,

    /// Tab load timeout, seconds
    pub tab_load_timeout_seconds: u64,

    /// Settle time after a wizard transition before acting, milliseconds
    pub settle_delay_ms: u64,

    /// Rewrite listing copy through the local LLM before listing
    pub enrichment_enabled: bool,

    /// Sold-items research settings
    pub research: ResearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Maximum result pages to walk per seller
    pub max_pages: u32,

    /// Drop items with fewer total sales than this
    pub min_sales: u32,
}

/// Endpoints and wizard URLs. Config file only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    pub webdriver_url: String,
    pub target_wizard_url: String,
    pub target_search_base: String,
    pub companion_url: String,
    pub enrichment_url: String,
    pub enrichment_model: String,
    /// Hard cap on wizard state transitions per item
    pub max_wizard_steps: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { user: UserConfig::default(), advanced: AdvancedConfig::default() }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            item_stagger_ms: 3000,
            step_retry_count: 3,
            step_retry_delay_ms: 2000,
            tab_load_timeout_seconds: 30,
            settle_delay_ms: 1500,
            enrichment_enabled: false,
            research: ResearchConfig::default(),
        }
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self { max_pages: 5, min_sales: 0 }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            target_wizard_url: "https://www.ebay.com/sl/sell".to_string(),
            target_search_base: "https://www.ebay.com/sch/i.html".to_string(),
            companion_url: "http://localhost:3017".to_string(),
            enrichment_url: "http://localhost:11434".to_string(),
            enrichment_model: "llama3.1".to_string(),
            max_wizard_steps: 12,
        }
    }
}

pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("crosslist");
        Ok(config_dir)
    }

    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("crosslist_config.json");
        Ok(Self { config_path })
    }

    /// Loads the config, writing defaults on first run.
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        let config_dir =
            self.config_path.parent().context("Failed to get config directory")?;
        if !config_dir.exists() {
            fs::create_dir_all(config_dir)
                .await
                .context("Failed to create config directory")?;
        }

        if !self.config_path.exists() {
            info!("first run, writing default configuration to {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            Ok(default_config)
        } else {
            self.load_config().await
        }
    }

    pub async fn load_config(&self) -> Result<AppConfig> {
        let contents = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read config at {:?}", self.config_path))?;
        let config: AppConfig =
            serde_json::from_str(&contents).context("Failed to parse configuration file")?;
        Ok(config)
    }

    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        let json =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        fs::write(&self.config_path, json)
            .await
            .with_context(|| format!("Failed to write config at {:?}", self.config_path))?;
        Ok(())
    }

    /// Default location of the work-item database.
    pub fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Failed to get user data directory")?
            .join("crosslist");
        Ok(data_dir.join("crosslist.db"))
    }
}
