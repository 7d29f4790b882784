//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The admin key and session secret are loaded from env vars or files,
//! never stored in the TOML directly to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ADMIN_KEY_ENV: &str = "ADMIN_KEY";
const SESSION_SECRET_ENV: &str = "SESSION_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Deployment path prefix without surrounding slashes; empty serves at `/`.
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Token, session and credential settings
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
    /// Background sweep period; 0 leaves cleanup to token creation alone.
    #[serde(default)]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Lifetime of a server-side session and its cookie `Max-Age`.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
    /// File holding the admin login key (alternative to ADMIN_KEY env var)
    #[serde(default)]
    pub admin_key_file: Option<PathBuf>,
    /// File holding the cookie signing secret (alternative to SESSION_SECRET env var)
    #[serde(default)]
    pub session_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub admin_key: Option<Secret<String>>,
    #[serde(skip)]
    pub session_secret: Option<Secret<String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: default_token_ttl_hours(),
            sweep_interval_secs: 0,
            cookie_name: default_cookie_name(),
            session_ttl_hours: default_session_ttl_hours(),
            admin_key_file: None,
            session_secret_file: None,
            admin_key: None,
            session_secret: None,
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_hours.saturating_mul(3600))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours.saturating_mul(3600))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_token_ttl_hours() -> u64 {
    24
}

fn default_session_ttl_hours() -> u64 {
    24
}

fn default_cookie_name() -> String {
    "session".into()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order, for both the admin key and session secret:
    /// 1. env var (ADMIN_KEY / SESSION_SECRET)
    /// 2. *_file path from config
    ///
    /// The admin key is required. A missing session secret is left as `None`
    /// and the caller generates one.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        config.server.path_prefix = config.server.path_prefix.trim_matches('/').to_owned();

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.auth.token_ttl_hours == 0 {
            return Err(common::Error::Config(
                "token_ttl_hours must be greater than 0".into(),
            ));
        }

        if config.auth.session_ttl_hours == 0 {
            return Err(common::Error::Config(
                "session_ttl_hours must be greater than 0".into(),
            ));
        }

        let cookie_name = &config.auth.cookie_name;
        if cookie_name.is_empty()
            || !cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(common::Error::Config(format!(
                "cookie_name must be non-empty and use only [A-Za-z0-9_-], got: {cookie_name:?}"
            )));
        }

        config.auth.admin_key =
            resolve_secret(ADMIN_KEY_ENV, config.auth.admin_key_file.as_deref())?;
        if config.auth.admin_key.is_none() {
            return Err(common::Error::MissingSecret {
                env: ADMIN_KEY_ENV,
                file_key: "auth.admin_key_file",
            });
        }

        config.auth.session_secret = resolve_secret(
            SESSION_SECRET_ENV,
            config.auth.session_secret_file.as_deref(),
        )?;

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("auth-gateway.toml")
    }
}

/// Env var wins over file. Empty or whitespace-only values count as unset.
fn resolve_secret(env: &str, file: Option<&Path>) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env) {
        let value = value.trim().to_owned();
        if !value.is_empty() {
            return Ok(Some(Secret::new(value)));
        }
    }

    let Some(file) = file else {
        return Ok(None);
    };
    let value = std::fs::read_to_string(file).map_err(|e| {
        common::Error::Config(format!("failed to read {}: {e}", file.display()))
    })?;
    let value = value.trim().to_owned();
    Ok((!value.is_empty()).then(|| Secret::new(value)))
}
