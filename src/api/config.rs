use crate::error::{EtbError, Result};
use serde::{Deserialize, Serialize};
use std::env;

pub const BASE_URL_VAR: &str = "ETB_API_BASE_URL";
pub const TOKEN_VAR: &str = "ETB_API_TOKEN";
pub const TIMEOUT_VAR: &str = "ETB_API_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Session token sent as `Authorization: Bearer ...`.
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Reads `ETB_API_BASE_URL`, `ETB_API_TOKEN` and `ETB_API_TIMEOUT_SECS`.
    /// Only the base url is required.
    pub fn from_env() -> Result<Self> {
        let base_url = env::var(BASE_URL_VAR)
            .map_err(|_| EtbError::Config(format!("{} is not set", BASE_URL_VAR)))?;

        let timeout_secs = match env::var(TIMEOUT_VAR) {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                EtbError::Config(format!("{} must be a whole number of seconds, got '{}'", TIMEOUT_VAR, raw))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url,
            bearer_token: env::var(TOKEN_VAR).ok().filter(|t| !t.is_empty()),
            timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_json() {
        let config: ApiConfig =
            serde_json::from_str(r#"{"base_url": "https://audit.example.com"}"#).unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.bearer_token, None);

        let config = ApiConfig::new("https://audit.example.com").with_token("abc");
        assert_eq!(config.bearer_token.as_deref(), Some("abc"));
    }
}
