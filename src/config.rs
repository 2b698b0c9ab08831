//! Runtime configuration parsed from environment variables.
//!
//! `main` loads `.env` through `dotenvy` first, so every value here can
//! come from either the process environment or that file.

use std::path::PathBuf;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FLEET_TICK_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing config: env var {var} not set")]
    Missing { var: &'static str },
    #[error("invalid SUPABASE_URL '{0}' (expected http:// or https://)")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_HTTP_TIMEOUT_SECS, connect_secs: DEFAULT_HTTP_CONNECT_TIMEOUT_SECS }
    }
}

/// Hosted backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project base URL without a trailing slash.
    pub url: String,
    pub anon_key: String,
    /// Where to persist provider tokens between runs, if anywhere.
    pub session_file: Option<PathBuf>,
    pub timeouts: HttpTimeouts,
}

impl SupabaseConfig {
    /// Load from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    ///
    /// Optional:
    /// - `SHUTTLE_SESSION_FILE`: token file path
    /// - `SHUTTLE_HTTP_TIMEOUT_SECS`: default 30
    /// - `SHUTTLE_HTTP_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// Returns `Ok(None)` when neither URL nor key is set (offline demo).
    ///
    /// # Errors
    ///
    /// Returns an error when only one of the pair is set or the URL has no
    /// HTTP scheme.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let url = non_empty_var("SUPABASE_URL");
        let anon_key = non_empty_var("SUPABASE_ANON_KEY");

        let (url, anon_key) = match (url, anon_key) {
            (None, None) => return Ok(None),
            (Some(_), None) => return Err(ConfigError::Missing { var: "SUPABASE_ANON_KEY" }),
            (None, Some(_)) => return Err(ConfigError::Missing { var: "SUPABASE_URL" }),
            (Some(url), Some(key)) => (url, key),
        };

        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::InvalidUrl(url));
        }

        Ok(Some(Self {
            url: url.trim_end_matches('/').to_owned(),
            anon_key,
            session_file: non_empty_var("SHUTTLE_SESSION_FILE").map(PathBuf::from),
            timeouts: HttpTimeouts {
                request_secs: env_parse_u64("SHUTTLE_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
                connect_secs: env_parse_u64("SHUTTLE_HTTP_CONNECT_TIMEOUT_SECS", DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
            },
        }))
    }
}

/// Whole-application settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` runs against the in-memory demo provider.
    pub supabase: Option<SupabaseConfig>,
    /// Fleet simulation period. `SHUTTLE_FLEET_TICK_SECS`, default 5.
    pub fleet_tick_secs: u64,
}

impl AppConfig {
    /// # Errors
    ///
    /// Propagates [`SupabaseConfig::from_env`] errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            supabase: SupabaseConfig::from_env()?,
            fleet_tick_secs: env_parse_u64("SHUTTLE_FLEET_TICK_SECS", DEFAULT_FLEET_TICK_SECS).max(1),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
