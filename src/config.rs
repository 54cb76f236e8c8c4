//! Configuration management
//!
//! Two layers:
//! - [`Config`]: service settings (listen address, token storage, retry
//!   budget) loaded with figment from an optional YAML file and
//!   `EBAY_CONNECT_*` environment variables.
//! - [`EbayConfig`]: eBay credentials and endpoints, resolved from the
//!   `EBAY_*` environment variables every time it is needed.

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Marketplace the service lists on
pub const EBAY_MARKETPLACE_ID: &str = "EBAY_US";

/// OAuth scopes required for inventory and listing management
pub const EBAY_SCOPES: &[&str] = &[
    "https://api.ebay.com/oauth/api_scope/sell.inventory",
    "https://api.ebay.com/oauth/api_scope/sell.inventory.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.account",
    "https://api.ebay.com/oauth/api_scope/sell.account.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.fulfillment",
    "https://api.ebay.com/oauth/api_scope/commerce.catalog.readonly",
];

/// Required credential variables, in reporting order
pub const REQUIRED_ENV_VARS: [&str; 4] = [
    "EBAY_CLIENT_ID",
    "EBAY_CLIENT_SECRET",
    "EBAY_DEV_ID",
    "EBAY_RU_NAME",
];

/// Optional environment selector variable
pub const ENVIRONMENT_VAR: &str = "EBAY_ENVIRONMENT";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before resolving credentials.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Token storage configuration
    pub storage: StorageConfig,
    /// Retry configuration for eBay API calls
    pub retry: RetryConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Where the OAuth callback sends the browser once it is done
    pub settings_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3900,
            settings_url: "/settings".to_string(),
        }
    }
}

/// Token storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Token file path (default: `~/.ebay-connect/token.json`)
    pub token_path: Option<PathBuf>,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per request (including the first)
    pub max_attempts: u32,
    /// Wait used when a 429 carries no usable `Retry-After` header, in seconds
    pub default_retry_after: u64,
    /// Length of one backoff second; network retries wait `2^attempt` units
    /// and rate-limited retries wait `Retry-After` units
    #[serde(with = "humantime_serde")]
    pub backoff_unit: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_retry_after: 60,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("EBAY_CONNECT_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Token file path, falling back to the home directory default
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the home directory
    /// cannot be determined.
    pub fn token_path(&self) -> Result<PathBuf> {
        if let Some(ref p) = self.storage.token_path {
            return Ok(p.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(".ebay-connect").join("token.json"))
    }
}

/// eBay environment selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EbayEnvironment {
    /// Sandbox (default)
    #[default]
    Sandbox,
    /// Production
    Production,
}

impl EbayEnvironment {
    /// Parse the selector, defaulting to sandbox (with a warning) for
    /// anything unrecognized
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("" | "sandbox") => Self::Sandbox,
            Some("production") => Self::Production,
            Some(other) => {
                warn!(value = %other, "Invalid {ENVIRONMENT_VAR}, defaulting to sandbox");
                Self::Sandbox
            }
        }
    }

    /// REST API base URL
    #[must_use]
    pub fn api_base_url(self) -> &'static str {
        match self {
            Self::Production => "https://api.ebay.com",
            Self::Sandbox => "https://api.sandbox.ebay.com",
        }
    }

    /// Browser authorization base URL
    #[must_use]
    pub fn auth_base_url(self) -> &'static str {
        match self {
            Self::Production => "https://auth.ebay.com",
            Self::Sandbox => "https://auth.sandbox.ebay.com",
        }
    }
}

/// Resolved eBay credentials and endpoints
#[derive(Debug, Clone)]
pub struct EbayConfig {
    /// App id
    pub client_id: String,
    /// Cert id
    pub client_secret: String,
    /// Developer id
    pub dev_id: String,
    /// Redirect URL name (`RuName`), sent as `redirect_uri`
    pub ru_name: String,
    /// Selected environment
    pub environment: EbayEnvironment,
    /// REST API base URL
    pub api_base_url: String,
    /// Browser authorization base URL
    pub auth_base_url: String,
    /// Scopes requested and granted
    pub scopes: Vec<String>,
}

impl EbayConfig {
    /// Resolve from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming every missing credential variable.
    pub fn resolve() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming every missing credential variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let missing: Vec<&str> = REQUIRED_ENV_VARS
            .iter()
            .copied()
            .filter(|name| get(*name).is_none())
            .collect();

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Missing eBay configuration. Required env vars: {}",
                missing.join(", ")
            )));
        }

        let [client_id, client_secret, dev_id, ru_name] =
            REQUIRED_ENV_VARS.map(|name| get(name).unwrap_or_default());

        let environment = EbayEnvironment::parse(lookup(ENVIRONMENT_VAR).as_deref());

        Ok(Self {
            client_id,
            client_secret,
            dev_id,
            ru_name,
            environment,
            api_base_url: environment.api_base_url().to_string(),
            auth_base_url: environment.auth_base_url().to_string(),
            scopes: EBAY_SCOPES.iter().map(ToString::to_string).collect(),
        })
    }

    /// Point the config at different hosts (mock servers, proxies)
    #[must_use]
    pub fn with_base_urls(mut self, api_base_url: &str, auth_base_url: &str) -> Self {
        self.api_base_url = api_base_url.trim_end_matches('/').to_string();
        self.auth_base_url = auth_base_url.trim_end_matches('/').to_string();
        self
    }

    /// Token endpoint URL
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/identity/v1/oauth2/token", self.api_base_url)
    }

    /// Space-joined scope list
    #[must_use]
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Whether all required credentials are present in the process environment
#[must_use]
pub fn is_configured() -> bool {
    is_configured_with(|name| env::var(name).ok())
}

/// Whether all required credentials are present in `lookup`
#[must_use]
pub fn is_configured_with<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    REQUIRED_ENV_VARS
        .iter()
        .all(|name| lookup(name).is_some_and(|v| !v.is_empty()))
}
