use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub watcher: WatcherConfig,
    pub proposal: ProposalConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Delay before the initial scan of cards already on the page.
    pub settle_delay_ms: u64,
    /// How often the page source is re-read for new listings.
    pub poll_interval_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalConfig {
    pub api_base_url: String,
    pub model: String,
    /// Interval between lookups for the bid-description input.
    pub search_interval_ms: u64,
    /// Give up looking for the bid-description input after this long.
    pub search_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub chrome_path: Option<String>,
    pub headless: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Built-in defaults so the agent runs without any config files
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.base_url", "http://localhost:3000")?
            .set_default("database.url", "sqlite://data/bidding-agent.db?mode=rwc")?
            .set_default("database.max_connections", 5)?
            .set_default("watcher.settle_delay_ms", 3000)?
            .set_default("watcher.poll_interval_secs", 30)?
            .set_default("watcher.user_agent", "BiddingAgent/0.1")?
            .set_default("proposal.api_base_url", "https://generativelanguage.googleapis.com/v1beta")?
            .set_default("proposal.model", "gemini-1.5-flash")?
            .set_default("proposal.search_interval_ms", 2000)?
            .set_default("proposal.search_timeout_secs", 120)?
            .set_default("browser.headless", false)?
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "BIDAGENT_"
            .add_source(Environment::with_prefix("BIDAGENT").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if Url::parse(&self.server.base_url).is_err() {
            return Err(ConfigError::Message("Invalid base URL format".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.watcher.poll_interval_secs == 0 {
            return Err(ConfigError::Message("Watcher poll_interval_secs must be greater than 0".into()));
        }

        if Url::parse(&self.proposal.api_base_url).is_err() {
            return Err(ConfigError::Message("Invalid proposal api_base_url".into()));
        }

        if self.proposal.model.trim().is_empty() {
            return Err(ConfigError::Message("Proposal model must not be empty".into()));
        }

        if self.proposal.search_interval_ms == 0 {
            return Err(ConfigError::Message("Proposal search_interval_ms must be greater than 0".into()));
        }

        Ok(())
    }
}
