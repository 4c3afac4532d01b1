//! Application configuration.
//!
//! Resolution order (later wins):
//! 1. Compiled defaults
//! 2. TOML file: `--config`, else `./cyleria-watch.toml`, else
//!    `<config dir>/cyleria-watch/config.toml`
//! 3. Environment variables (`DISCORD_TOKEN`, `CYLERIA_*`)

use std::path::{Path, PathBuf};
use std::time::Duration;

use profile_parser::fetcher::DEFAULT_PROFILE_URL_TEMPLATE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::NicknameCase;
use crate::logging::LoggingConfig;
use crate::monitor::{DEFAULT_LEVEL_THRESHOLD, PollSchedulerConfig};
use crate::notification::DiscordConfig;
use crate::store::StoreBackend;
use crate::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "cyleria-watch.toml";

pub const ENV_DISCORD_TOKEN: &str = "DISCORD_TOKEN";
pub const ENV_STORE_PATH: &str = "CYLERIA_STORE_PATH";
pub const ENV_POLL_INTERVAL: &str = "CYLERIA_POLL_INTERVAL_SECS";
pub const ENV_LEVEL_THRESHOLD: &str = "CYLERIA_LEVEL_THRESHOLD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Case policy for nickname keys.
    pub nickname_case: NicknameCase,
    pub monitor: MonitorConfig,
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub watchlist: WatchlistConfig,
    pub discord: DiscordConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    /// Minimum gap between two profile requests.
    pub fetch_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub level_threshold: u32,
    pub death_max_len: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            fetch_delay_ms: 2000,
            request_timeout_secs: 15,
            level_threshold: DEFAULT_LEVEL_THRESHOLD,
            death_max_len: profile_parser::snapshot::MAX_DEATH_LEN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Profile URL with a `{name}` placeholder.
    pub profile_url_template: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            profile_url_template: DEFAULT_PROFILE_URL_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: PathBuf::from("cyleria-watch.db"),
        }
    }
}

/// Static list of nicknames merged into one scope at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistConfig {
    pub path: Option<PathBuf>,
    pub scope: String,
    pub destination: Option<String>,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("players.txt")),
            scope: "default".to_string(),
            destination: None,
        }
    }
}

impl AppConfig {
    /// First existing default config file, if any.
    pub fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("cyleria-watch").join("config.toml"))
            .filter(|path| path.is_file())
    }

    /// Load configuration. An explicit path must exist; without one a
    /// missing default file means compiled defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    Error::config(format!("cannot read {}: {e}", path.display()))
                })?;
                debug!(path = %path.display(), "loading configuration file");
                Self::from_toml_str(&raw)?
            }
            None => {
                debug!("no configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::config(format!("invalid configuration: {e}")))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = lookup(ENV_DISCORD_TOKEN).filter(|t| !t.trim().is_empty()) {
            self.discord.token = Some(token.trim().to_string());
        }
        if let Some(path) = lookup(ENV_STORE_PATH).filter(|p| !p.trim().is_empty()) {
            self.store.path = PathBuf::from(path.trim());
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL) {
            self.monitor.interval_secs = parse_env(ENV_POLL_INTERVAL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LEVEL_THRESHOLD) {
            self.monitor.level_threshold = parse_env(ENV_LEVEL_THRESHOLD, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitor.level_threshold == 0 {
            return Err(Error::config("monitor.level_threshold must be at least 1"));
        }
        if self.monitor.interval_secs == 0 {
            return Err(Error::config("monitor.interval_secs must be at least 1"));
        }
        if self.monitor.request_timeout_secs == 0 {
            return Err(Error::config("monitor.request_timeout_secs must be at least 1"));
        }
        if !self.source.profile_url_template.contains("{name}") {
            return Err(Error::config(
                "source.profile_url_template must contain a {name} placeholder",
            ));
        }
        if self.watchlist.scope.trim().is_empty() {
            return Err(Error::config("watchlist.scope must not be empty"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_secs)
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.monitor.fetch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.request_timeout_secs)
    }

    pub fn scheduler_config(&self) -> PollSchedulerConfig {
        PollSchedulerConfig {
            interval: self.poll_interval(),
            level_threshold: self.monitor.level_threshold,
            profile_url_template: self.source.profile_url_template.clone(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::config(format!("{key} has invalid value '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
        assert_eq!(config.fetch_delay(), Duration::from_secs(2));
        assert_eq!(config.monitor.level_threshold, 10);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.nickname_case, NicknameCase::Lowercase);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            nickname_case = "preserve"

            [monitor]
            level_threshold = 25

            [store]
            backend = "json"
            path = "state/subs.json"

            [watchlist]
            scope = "guild-1"
            destination = "123"

            [discord]
            username = "Watcher"
            "#,
        )
        .unwrap();

        assert_eq!(config.nickname_case, NicknameCase::Preserve);
        assert_eq!(config.monitor.level_threshold, 25);
        assert_eq!(config.monitor.interval_secs, 300);
        assert_eq!(config.store.backend, StoreBackend::Json);
        assert_eq!(config.store.path, PathBuf::from("state/subs.json"));
        assert_eq!(config.watchlist.destination.as_deref(), Some("123"));
        assert_eq!(config.discord.username.as_deref(), Some("Watcher"));
        assert!(config.discord.token.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DISCORD_TOKEN, " secret "),
            (ENV_STORE_PATH, "/tmp/watch.db"),
            (ENV_POLL_INTERVAL, "60"),
            (ENV_LEVEL_THRESHOLD, "5"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.discord.token.as_deref(), Some("secret"));
        assert_eq!(config.store.path, PathBuf::from("/tmp/watch.db"));
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.monitor.level_threshold, 5);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_LEVEL_THRESHOLD).then(|| "ten".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = AppConfig::default();
        config.monitor.level_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.monitor.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.source.profile_url_template = "https://example.com/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(AppConfig::from_toml_str("[monitor\ninterval_secs = 1").is_err());
    }
}
