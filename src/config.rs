//! Configuration loader for the `agrivision-advisor` client.
//!
//! The client has a single runtime setting, the prediction backend's base
//! URL, read from the environment (with optional `.env` support provided by
//! the caller). The cache TTL is a compile-time constant in `cache`.
//!
use std::env;

use anyhow::{anyhow, Result};

/// Backend used when `AGRIVISION_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Parse an optional string environment variable with a default value.
macro_rules! env_or_default {
    ($var_name:expr, $default:expr) => {
        match env::var($var_name) {
            Ok(v) => v,
            Err(env::VarError::NotPresent) => $default.to_string(),
            Err(e) => return Err(anyhow!("Invalid {}: {}", $var_name, e)),
        }
    };
}

/// Strongly typed client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // ---
    /// Prediction backend base URL, without trailing slash.
    pub api_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `AGRIVISION_API_URL` – backend base URL (default: `http://localhost:8000`)
///
/// Returns an error if the variable is set but empty or not valid unicode.
pub fn load_from_env() -> Result<Config> {
    // ---
    let api_url = env_or_default!("AGRIVISION_API_URL", DEFAULT_API_URL);
    from_api_url(&api_url)
}

/// Validate and normalise a backend base URL.
pub fn from_api_url(api_url: &str) -> Result<Config> {
    // ---
    let api_url = api_url.trim().trim_end_matches('/');
    if api_url.is_empty() {
        return Err(anyhow!("AGRIVISION_API_URL must not be empty"));
    }
    if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
        return Err(anyhow!(
            "AGRIVISION_API_URL must start with http:// or https://, got '{}'",
            api_url
        ));
    }

    Ok(Config {
        api_url: api_url.to_string(),
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  AGRIVISION_API_URL : {}", self.api_url);
        tracing::info!("  CACHE_TTL          : {:?}", crate::cache::CACHE_TTL);
    }
}
