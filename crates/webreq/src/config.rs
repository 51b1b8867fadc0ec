//! Request defaults loaded from TOML.
//!
//! ```toml
//! json = true
//! follow_redirects = true
//! connect_timeout = 5
//! timeout = 30
//!
//! [auth]
//! username = "${API_USER}"
//! password = "${API_PASSWORD}"
//!
//! [cache]
//! kind = "fixed-expiration"
//! max_age = 300
//! dir = "~/.cache/webreq"
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `auth.username`, `auth.password` and `cache.dir` support `$VAR`, `${VAR}`
//! and a leading `~`. Referencing an unset variable is an error.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheStore, FixedExpirationCache, NullCache};
use crate::error::Error;

/// Defaults applied to requests built with [`Request::from_config`](crate::Request::from_config).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Add JSON `Accept`/`Content-Type` headers when absent.
    pub json: bool,
    /// Follow HTTP redirects.
    pub follow_redirects: bool,
    /// Log request timing and error bodies.
    pub debug: bool,
    /// Connect timeout in seconds.
    pub connect_timeout: Option<u64>,
    /// Whole-request timeout in seconds.
    pub timeout: Option<u64>,
    /// Basic auth credentials.
    pub auth: Option<AuthConfig>,
    /// Response cache selection.
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            json: false,
            follow_redirects: true,
            debug: false,
            connect_timeout: None,
            timeout: None,
            auth: None,
            cache: CacheConfig::default(),
        }
    }
}

/// Basic auth credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Which [`CacheStore`] requests use.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store variant.
    pub kind: CacheKind,
    /// Entry lifetime in seconds for `fixed-expiration`; 0 keeps entries forever.
    pub max_age: u64,
    /// Entry directory; the system temp directory when unset.
    pub dir: Option<String>,
}

/// Cache store variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    /// [`NullCache`]
    #[default]
    None,
    /// [`FixedExpirationCache`]
    FixedExpiration,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`auth.password`").
        field: String,
        /// Error message.
        message: String,
    },
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs)
    }

    /// Whole-request timeout as a duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Build the configured cache store.
    ///
    /// Fails with [`Error::Config`] if a temp-directory cache is requested
    /// and no temp directory is available.
    pub fn cache_store(&self) -> Result<Arc<dyn CacheStore>, Error> {
        let max_age = Duration::from_secs(self.cache.max_age);
        Ok(match (self.cache.kind, &self.cache.dir) {
            (CacheKind::None, _) => Arc::new(NullCache),
            (CacheKind::FixedExpiration, Some(dir)) => {
                Arc::new(FixedExpirationCache::with_dir(dir, max_age))
            }
            (CacheKind::FixedExpiration, None) => Arc::new(FixedExpirationCache::new(max_age)?),
        })
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref mut auth) = self.auth {
            auth.username = expand_env(&auth.username, "auth.username")?;
            auth.password = expand_env(&auth.password, "auth.password")?;
        }
        if let Some(ref dir) = self.cache.dir {
            self.cache.dir = Some(expand_env(dir, "cache.dir")?);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (value, field) in [
            (self.connect_timeout, "connect_timeout"),
            (self.timeout, "timeout"),
        ] {
            if value == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        if let Some(ref auth) = self.auth
            && auth.username.is_empty()
        {
            return Err(ConfigError::Validation(
                "auth.username cannot be empty".to_owned(),
            ));
        }
        if let Some(ref dir) = self.cache.dir
            && dir.is_empty()
        {
            return Err(ConfigError::Validation("cache.dir cannot be empty".to_owned()));
        }
        Ok(())
    }
}

impl FromStr for ClientConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut config: Self = toml::from_str(s)?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Expand `~` and environment variables in `value`.
fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    shellexpand::full(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: e.to_string(),
        })
}
