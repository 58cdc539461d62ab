//! Configuration types and loading
//!
//! Config path precedence: explicit path > CONFIG_PATH env var > default file
//! name. A missing file is not an error; every field has a default matching
//! the production identity provider and the standard credential locations.
//! Secrets never live in this file: keys and tokens come from environment
//! variables and credential files only.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use droid_auth::{DEFAULT_REFRESH_TIMEOUT, REFRESH_INTERVAL, TOKEN_ENDPOINT};
use tracing::info;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "droid-gateway.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub identity: IdentityConfig,
    pub sources: SourcesConfig,
    pub refresh: RefreshConfig,
}

/// Identity-provider settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub token_endpoint: String,
    /// Registered client id. Generated once per process when absent.
    pub client_id: Option<String>,
    pub refresh_timeout_secs: u64,
}

/// Where credentials are looked up, in priority order
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Env var holding a fixed API key (highest priority)
    pub fixed_key_env: String,
    /// Env var holding a single refresh token
    pub refresh_token_env: String,
    /// Multi-account file, relative to the working directory
    pub pool_file: PathBuf,
    /// Single-account credential file; defaults to `~/.factory/auth.json`
    pub home_file: Option<PathBuf>,
}

/// Token refresh behaviour
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Cached access tokens older than this are refreshed before use
    pub stale_after_secs: u64,
    /// Refresh tokens once during initialization
    pub warm_up: bool,
    /// Pool mode only: interval of the background refresh task
    pub background_refresh_secs: Option<u64>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            client_id: None,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT.as_secs(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            fixed_key_env: "FACTORY_API_KEY".to_string(),
            refresh_token_env: "DROID_REFRESH_KEY".to_string(),
            pool_file: PathBuf::from("auth.json"),
            home_file: None,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: REFRESH_INTERVAL.as_secs(),
            warm_up: true,
            background_refresh_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Resolve config file path from an explicit path or CONFIG_PATH env var.
    pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
        if let Some(p) = explicit {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    pub fn validate(&self) -> common::Result<()> {
        if !self.identity.token_endpoint.starts_with("http://")
            && !self.identity.token_endpoint.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "token_endpoint must start with http:// or https://, got: {}",
                self.identity.token_endpoint
            )));
        }
        if self.identity.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0".into(),
            ));
        }
        if self
            .identity
            .client_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(common::Error::Config("client_id must not be blank".into()));
        }
        if self.refresh.stale_after_secs == 0 {
            return Err(common::Error::Config(
                "stale_after_secs must be greater than 0".into(),
            ));
        }
        if self.refresh.background_refresh_secs == Some(0) {
            return Err(common::Error::Config(
                "background_refresh_secs must be greater than 0 when set".into(),
            ));
        }
        Ok(())
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.identity.refresh_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.refresh.stale_after_secs)
    }

    pub fn background_refresh_interval(&self) -> Option<Duration> {
        self.refresh.background_refresh_secs.map(Duration::from_secs)
    }
}
