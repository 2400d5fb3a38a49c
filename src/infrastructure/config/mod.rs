//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub storage: StorageConfig,
    pub poller: PollerConfig,
    pub source: SourceConfig,
    pub security: SecurityConfig,
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    /// Text every command must start with. Empty means no prefix.
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub db_file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PollerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

/// External read API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SourceConfig {
    /// Entity kind shown in notifications
    pub kind: String,
    pub primary_url: String,
    pub fallback_url: String,
    /// Canonical item link is `<link-base>/<version>`
    pub link_base: String,
    pub user_agent: String,
    pub referer: String,
    pub cookie: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SecurityConfig {
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AdaptersConfig {
    pub telegram: Option<TelegramConfig>,
    pub console: Option<ConsoleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
}

/// Transport the bot runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterChoice {
    Telegram(String),
    Console,
}

/// Platform-specific watch-bot home directory
pub fn watch_bot_home() -> PathBuf {
    if let Ok(home) = std::env::var("WATCH_BOT_HOME") {
        return PathBuf::from(home);
    }
    let base = if cfg!(target_os = "windows") {
        std::env::var("APPDATA")
    } else {
        std::env::var("HOME")
    };
    match base {
        Ok(p) if cfg!(target_os = "windows") => PathBuf::from(p).join("watch-bot"),
        Ok(p) => PathBuf::from(p).join(".watch-bot"),
        Err(_) => PathBuf::from(".watch-bot"),
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "watch-bot".to_string(),
            prefix: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: watch_bot_home().join("data"),
            db_file: "tracker.db".to_string(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 90,
            fetch_timeout_secs: 15,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: "Bilibili dynamic".to_string(),
            primary_url: "https://api.vc.bilibili.com/dynamic_svr/v1/dynamic_svr/space_history"
                .to_string(),
            fallback_url: "https://api.bilibili.com/x/polymer/web-dynamic/v1/feed/space".to_string(),
            link_base: "https://t.bilibili.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            referer: "https://www.bilibili.com/".to_string(),
            cookie: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window_seconds: 60,
        }
    }
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            telegram: Some(TelegramConfig {
                enabled: false,
                token: None,
            }),
            console: Some(ConsoleConfig {
                enabled: true,
            }),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    /// Defaults overlaid with environment variables
    pub fn load_env() -> Self {
        Config::default().with_env()
    }

    /// Overlay environment variables on top of this configuration
    pub fn with_env(mut self) -> Self {
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if let Some(ref mut tg) = self.adapters.telegram {
                tg.token = Some(token);
                tg.enabled = true;
            }
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }

        if let Ok(cookie) = std::env::var("WATCH_BOT_COOKIE") {
            self.source.cookie = Some(cookie);
        }

        if let Ok(secs) = std::env::var("WATCH_BOT_POLL_SECS") {
            match secs.parse() {
                Ok(v) => self.poller.interval_secs = v,
                Err(_) => tracing::warn!("Ignoring invalid WATCH_BOT_POLL_SECS `{}`", secs),
            }
        }

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poller.interval_secs == 0 {
            return Err(ConfigError::InvalidValue("poller.interval-secs must be > 0".to_string()));
        }
        if self.poller.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "poller.fetch-timeout-secs must be > 0".to_string(),
            ));
        }
        if self.storage.db_file.is_empty() {
            return Err(ConfigError::InvalidValue("storage.db-file is empty".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poller.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.poller.fetch_timeout_secs)
    }

    pub fn telegram_token(&self) -> Option<String> {
        self.adapters
            .telegram
            .as_ref()
            .filter(|t| t.enabled)
            .and_then(|t| t.token.clone())
    }

    /// Telegram when it has a token, else the console when enabled
    pub fn adapter(&self) -> Result<AdapterChoice, ConfigError> {
        if let Some(token) = self.telegram_token() {
            return Ok(AdapterChoice::Telegram(token));
        }
        if self.adapters.console.as_ref().is_some_and(|c| c.enabled) {
            return Ok(AdapterChoice::Console);
        }
        Err(ConfigError::InvalidValue(
            "no adapter enabled: set a telegram token or enable adapters.console".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(90));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(15));
        assert_eq!(config.storage.db_file, "tracker.db");
        assert!(config.validate().is_ok());
        assert!(config.telegram_token().is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "poller:\n  interval-secs: 30\nsource:\n  cookie: SESSDATA=x\n",
        )
        .unwrap();
        assert_eq!(config.poller.interval_secs, 30);
        assert_eq!(config.poller.fetch_timeout_secs, 15);
        assert_eq!(config.source.cookie.as_deref(), Some("SESSDATA=x"));
        assert_eq!(config.source.link_base, "https://t.bilibili.com");
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = Config::default().to_yaml().unwrap();
        assert!(yaml.contains("interval-secs: 90"));
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.storage.db_file, "tracker.db");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.poller.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_adapter_selection() {
        assert_eq!(Config::default().adapter().unwrap(), AdapterChoice::Console);

        let config = Config::from_yaml(
            "adapters:\n  telegram:\n    enabled: true\n    token: abc\n  console:\n    enabled: false\n",
        )
        .unwrap();
        assert_eq!(config.adapter().unwrap(), AdapterChoice::Telegram("abc".to_string()));
    }

    #[test]
    fn test_no_adapter_enabled() {
        let config = Config::from_yaml("adapters:\n  console:\n    enabled: false\n").unwrap();
        assert!(matches!(config.adapter(), Err(ConfigError::InvalidValue(_))));

        let mut config = Config::default();
        config.adapters.console = None;
        assert!(matches!(config.adapter(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(Config::from_yaml("poller: ["), Err(ConfigError::Parse(_))));
    }
}
