//! Application configuration management.
//!
//! This module handles loading the client configuration: the RPC endpoint,
//! optional shared application key, request timeout, identity-provider client
//! id and the session/navigation defaults.
//!
//! Configuration is stored at `~/.config/backoffice/config.json` and can be
//! overridden from the environment (`BACKOFFICE_*` variables).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::RpcError;
use crate::guard::Role;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "backoffice";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Session lifetime when the backend does not send `expires_in`.
const DEFAULT_SESSION_TTL_SECS: u64 = 12 * 60 * 60;

const ENV_ENDPOINT_URL: &str = "BACKOFFICE_ENDPOINT_URL";
const ENV_APP_KEY: &str = "BACKOFFICE_APP_KEY";
const ENV_TIMEOUT_SECS: &str = "BACKOFFICE_TIMEOUT_SECS";
const ENV_CLIENT_ID: &str = "BACKOFFICE_CLIENT_ID";
const ENV_SESSION_TTL_HOURS: &str = "BACKOFFICE_SESSION_TTL_HOURS";

/// Message fragments that mark a backend failure as an authorization rejection.
pub const DEFAULT_AUTH_REJECTION_PATTERNS: &[&str] = &[
    "unauthorized",
    "not authorized",
    "invalid token",
    "invalid_token",
    "token expired",
    "expired token",
    "token_expired",
    "session expired",
    "invalid session",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RPC endpoint every action is POSTed to.
    pub endpoint_url: Option<String>,
    /// Shared application secret sent as `appKey` in every envelope.
    pub app_key: Option<String>,
    pub timeout_secs: u64,
    /// Identity-provider client id forwarded with id-token logins.
    pub client_id: Option<String>,
    pub session_ttl_secs: u64,
    /// Unauthenticated landing page.
    pub entry_point: String,
    /// Return target used when the originating page is unknown.
    pub default_page: String,
    pub auth_rejection_patterns: Vec<String>,
    /// Argon2 PHC hashes accepted for offline password login.
    pub offline_password_hashes: Vec<String>,
    pub offline_role: Role,
    /// Spawn a `me` refresh when a guarded page is admitted.
    pub refresh_on_guard: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            app_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            client_id: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            entry_point: "login".to_string(),
            default_page: "dashboard".to_string(),
            auth_rejection_patterns: DEFAULT_AUTH_REJECTION_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            offline_password_hashes: Vec::new(),
            offline_role: Role::Admin,
            refresh_on_guard: true,
        }
    }
}

impl Config {
    /// Load the config file (if present) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Override fields from variables resolved by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_ENDPOINT_URL) {
            self.endpoint_url = Some(url);
        }
        if let Some(key) = lookup(ENV_APP_KEY) {
            self.app_key = Some(key);
        }
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            self.client_id = Some(client_id);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", ENV_TIMEOUT_SECS))?;
        }
        if let Some(hours) = lookup(ENV_SESSION_TTL_HOURS) {
            let hours: u64 = hours
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of hours", ENV_SESSION_TTL_HOURS))?;
            self.session_ttl_secs = hours
                .checked_mul(60 * 60)
                .with_context(|| format!("{} of {} hours is out of range", ENV_SESSION_TTL_HOURS, hours))?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// The configured endpoint, or a configuration error when it is missing.
    pub fn endpoint(&self) -> Result<&str, RpcError> {
        match self.endpoint_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(RpcError::Configuration(format!(
                "endpoint URL is not configured (set {} or endpoint_url in {})",
                ENV_ENDPOINT_URL, CONFIG_FILE
            ))),
        }
    }

    /// Startup check: a config without an endpoint cannot serve any action.
    pub fn validate(&self) -> Result<(), RpcError> {
        self.endpoint()?;
        if self.timeout_secs == 0 {
            return Err(RpcError::Configuration(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
