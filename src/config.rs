use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::notify::batcher::{DEFAULT_DEADLINE, DISCORD_MAX_EMBEDS};

pub const CONFIG_PATH_ENV_VAR: &str = "VINTED_SCOUT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "vinted-scout.toml";
/// Legacy variable still honoured for the admin token
pub const API_TOKEN_ENV_VAR: &str = "API_TOKEN";

/// Top-level config (vinted-scout.toml + SCOUT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vinted-scout.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Bearer token for the admin API; without one every admin call is refused.
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    pub base_url: String,
    /// Merged with the PROXY_URLS environment variable at startup.
    pub proxies: Vec<String>,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.vinted.co.uk".to_string(),
            proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub lookback_hours: i64,
    pub interval_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            interval_secs: 60,
        }
    }
}

impl ScraperConfig {
    /// Negative values mean no lookback; values too large for a duration saturate.
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.lookback_hours.max(0)).unwrap_or(chrono::Duration::MAX)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Notifications are disabled when unset.
    pub discord_webhook_url: Option<String>,
    pub max_items_per_message: usize,
    pub deadline_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            discord_webhook_url: None,
            max_items_per_message: DISCORD_MAX_EMBEDS,
            deadline_secs: DEFAULT_DEADLINE.as_secs(),
        }
    }
}

impl NotificationsConfig {
    /// Chunk size, capped at what Discord accepts in one message.
    pub fn max_items(&self) -> usize {
        self.max_items_per_message.clamp(1, DISCORD_MAX_EMBEDS)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl ScoutConfig {
    /// Load config from defaults, a TOML file and SCOUT_* env vars, in that order.
    ///
    /// The file is `path` if given, else `$VINTED_SCOUT_CONFIG`, else
    /// `vinted-scout.toml` in the working directory. A missing file is fine.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut config: ScoutConfig = Self::figment(path).extract()?;

        if config.server.api_token.is_none() {
            config.server.api_token = std::env::var(API_TOKEN_ENV_VAR)
                .ok()
                .filter(|token| !token.is_empty());
        }

        Ok(config)
    }

    pub fn figment(path: Option<&Path>) -> Figment {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(ScoutConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SCOUT_").split("__"))
    }
}
