use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::RelayError;

/// Who receives a pushed update
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Attribution {
    /// Every chat with at least one watched API
    #[default]
    Broadcast,
    /// Only chats that registered the push's source URL
    UrlMatch,
}

impl std::fmt::Display for Attribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attribution::Broadcast => write!(f, "broadcast"),
            Attribution::UrlMatch => write!(f, "url_match"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub push: PushConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// In groups, only administrators may add or remove APIs
    #[serde(default)]
    pub require_admin: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PushConfig {
    #[serde(default)]
    pub attribution: Attribution,
}

fn default_interval_secs() -> u64 {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_listen_addr() -> String {
    "0.0.0.0:8443".to_string()
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poller.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.poller.fetch_timeout_secs)
    }

    /// The validated listen address. Call `validate` first.
    pub fn listen_addr(&self) -> Result<SocketAddr, RelayError> {
        self.server.listen_addr.parse().map_err(|e| {
            RelayError::Config(format!(
                "server.listen_addr '{}' is not a socket address: {}",
                self.server.listen_addr, e
            ))
        })
    }

    /// Load from a TOML file, then apply environment overrides.
    ///
    /// A missing file is not an error: everything except the bot token has
    /// a default, and the token may come from `TELEGRAM_TOKEN`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_env(
            std::env::var("TELEGRAM_TOKEN").ok(),
            std::env::var("PORT").ok(),
        )?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// `token` fills an empty bot token; `port` replaces the listen port
    fn apply_env(&mut self, token: Option<String>, port: Option<String>) -> Result<(), RelayError> {
        if self.telegram.bot_token.trim().is_empty() {
            if let Some(token) = token {
                self.telegram.bot_token = token;
            }
        }

        if let Some(port) = port.filter(|p| !p.trim().is_empty()) {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| RelayError::Config(format!("PORT '{}' is not a valid port", port)))?;
            let mut addr = self.listen_addr()?;
            addr.set_port(port);
            self.server.listen_addr = addr.to_string();
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(RelayError::Config(
                "telegram.bot_token is empty and TELEGRAM_TOKEN is not set".to_string(),
            ));
        }
        if self.poller.interval_secs == 0 {
            return Err(RelayError::Config(
                "poller.interval_secs must be set to a positive number of seconds".to_string(),
            ));
        }
        if self.poller.fetch_timeout_secs == 0 {
            return Err(RelayError::Config(
                "poller.fetch_timeout_secs must be positive".to_string(),
            ));
        }
        self.listen_addr()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "123:abc"
            require_admin = true

            [poller]
            interval_secs = 3600
            fetch_timeout_secs = 30

            [server]
            listen_addr = "127.0.0.1:9000"

            [push]
            attribution = "url_match"
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert!(config.telegram.require_admin);
        assert_eq!(config.poll_interval(), Duration::from_secs(3600));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.push.attribution, Attribution::UrlMatch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("[telegram]\nbot_token = \"t\"\n").unwrap();
        assert_eq!(config.poller.interval_secs, 10);
        assert_eq!(config.poller.fetch_timeout_secs, 15);
        assert_eq!(config.server.listen_addr, "0.0.0.0:8443");
        assert_eq!(config.push.attribution, Attribution::Broadcast);
        assert!(!config.telegram.require_admin);
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let config = Config::parse("").unwrap();
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::parse("[telegram]\nbot_token = \"t\"\n").unwrap();
        config.poller.fetch_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::parse("[telegram]\nbot_token = \"t\"\n").unwrap();
        config.server.listen_addr = "nowhere".into();
        assert!(matches!(config.validate(), Err(RelayError::Config(_))));

        assert!(Config::parse("[push]\nattribution = \"sideways\"\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::parse("").unwrap();
        config
            .apply_env(Some("env-token".into()), Some("9999".into()))
            .unwrap();
        assert_eq!(config.telegram.bot_token, "env-token");
        assert_eq!(config.server.listen_addr, "0.0.0.0:9999");

        // A token from the file wins over the environment
        let mut config = Config::parse("[telegram]\nbot_token = \"file\"\n").unwrap();
        config.apply_env(Some("env".into()), None).unwrap();
        assert_eq!(config.telegram.bot_token, "file");

        let mut config = Config::parse("").unwrap();
        assert!(config.apply_env(None, Some("http".into())).is_err());
    }
}
