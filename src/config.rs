//! Client configuration

use std::{env, time::Duration};

use once_cell::sync::Lazy;
use thiserror::Error;
use url::Url;

pub const BASE_URL_VAR: &str = "CHURCH_API_URL";
pub const TIMEOUT_VAR: &str = "CHURCH_API_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

static DEFAULT_BASE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://localhost:4000/api").expect("default base URL is valid"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid base URL {0:?}")]
    InvalidUrl(String, #[source] url::ParseError),

    #[error("Invalid timeout {0:?}, expected whole seconds")]
    InvalidTimeout(String),
}

/// Connection settings for the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:4000/api`
    pub base_url: Url,

    /// Upper bound for every request, connect to last body byte
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Parse the base URL from a string
    pub fn parse<S>(base_url: S) -> Result<Self, ConfigError>
    where
        S: AsRef<str>,
    {
        let raw = base_url.as_ref();
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(raw.to_string(), e))?;

        Ok(Self::new(url))
    }

    /// Read `CHURCH_API_URL` and `CHURCH_API_TIMEOUT_SECS`, loading a `.env`
    /// file first if one is present. Missing variables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }

        let mut config = match env::var(BASE_URL_VAR) {
            Ok(raw) => Self::parse(raw)?,
            Err(_) => Self::default(),
        };

        if let Ok(raw) = env::var(TIMEOUT_VAR) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Absolute URL for an endpoint path such as `/miembros`
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_points_at_local_backend() {
        let config = ClientConfig::default();

        assert_eq!("http://localhost:4000/api", config.base_url.as_str());
        assert_eq!(Duration::from_secs(30), config.timeout);
    }

    #[test]
    fn test_endpoint_keeps_api_prefix() {
        let config = ClientConfig::parse("https://portal.example.org/api/").unwrap();

        assert_eq!(
            "https://portal.example.org/api/miembros-universal/7",
            config.endpoint("/miembros-universal/7")
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ClientConfig::parse("not a url"),
            Err(ConfigError::InvalidUrl(..))
        ));
    }
}
