use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::error::Error;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub config: ConfigOptions,
    pub target: Target,
}

/// The resource being watched: one URL and one selector within it.
#[derive(Debug, Deserialize)]
pub struct Target {
    pub url: String,
    pub selector: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfigOptions {
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub alert_webhook_url: Option<String>,
    pub lamp_url: Option<String>,
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub ignore_minor_changes: bool,
}

fn default_check_interval_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ConfigOptions {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Loads and validates a configuration file. Defaults are resolved here,
    /// once, never re-merged per call.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        // if channel endpoints are not set in the file, fall back to env with dotenvy
        if config.config.alert_webhook_url.is_none() {
            config.config.alert_webhook_url = dotenvy::var("ALERT_WEBHOOK_URL").ok();
        }
        if config.config.lamp_url.is_none() {
            config.config.lamp_url = dotenvy::var("LAMP_URL").ok();
        }

        Url::parse(&config.target.url)?;
        if config.target.selector.trim().is_empty() {
            return Err(Error::Config("target selector must not be empty".to_string()));
        }
        if config.config.check_interval_ms == 0 {
            return Err(Error::Config(
                "check_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    /// Default location: `<config_dir>/pagewatch/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pagewatch")
            .join("config.toml")
    }

    pub fn load_default() -> Result<Config, Error> {
        Self::load(Self::default_path())
    }
}
