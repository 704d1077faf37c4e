use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use ghget_fetch::{DEFAULT_API_BASE_URL, DEFAULT_USER_AGENT};
use ghget_platform::AppPaths;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "GHGET_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bearer credential for the release API.
    pub token: Option<String>,
    pub user_agent: String,
    pub api_base_url: String,
    /// Defaults to `<user data>/ghget`.
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_retention_days: u32,
    pub request_timeout_secs: u64,
    pub install_assets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_dir: None,
            log_level: "info".to_string(),
            log_retention_days: 7,
            request_timeout_secs: 30,
            install_assets: false,
        }
    }
}

impl Config {
    /// Defaults, then the user config file, then `explicit`, then `GHGET_*`
    /// environment variables.
    pub fn figment(user_file: Option<&Path>, explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = user_file {
            figment = figment.merge(Toml::file(path));
        }
        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                bail!("config file not found: {}", path.display());
            }
        }
        let user_file = ghget_platform::dir::app_config_file();
        Self::figment(user_file.as_deref(), explicit)
            .extract()
            .context("invalid configuration")
    }

    pub fn paths(&self) -> Result<AppPaths> {
        match &self.data_dir {
            Some(dir) => Ok(AppPaths::new(dir)),
            None => AppPaths::default_location().context("failed to locate the data directory"),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
