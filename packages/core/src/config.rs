//! Editor Configuration
//!
//! Settings for the store client, the expand/collapse auto-save and the event
//! channel. Defaults work for a store on localhost; `from_env` overlays the
//! `CARDTREE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_STORE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 1_200;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: String, value: String },

    #[error("Store URL must start with http:// or https://, got '{url}'")]
    InvalidStoreUrl { url: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: String },
}

/// Editor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Base URL of the document store API
    pub store_url: String,

    /// Bearer token sent with every store request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    pub request_timeout_ms: u64,

    /// Quiet period before expand/collapse toggles are sent
    pub autosave_debounce_ms: u64,

    pub event_channel_capacity: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            store_url: DEFAULT_STORE_URL.to_string(),
            auth_token: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EditorConfig {
    /// Defaults overlaid with `CARDTREE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = env::var("CARDTREE_STORE_URL") {
            config.store_url = url;
        }
        if let Ok(token) = env::var("CARDTREE_AUTH_TOKEN") {
            if !token.trim().is_empty() {
                config.auth_token = Some(token);
            }
        }
        if let Some(timeout) = parse_var("CARDTREE_REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = timeout;
        }
        if let Some(debounce) = parse_var("CARDTREE_AUTOSAVE_DEBOUNCE_MS")? {
            config.autosave_debounce_ms = debounce;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.store_url.starts_with("http://") || self.store_url.starts_with("https://")) {
            return Err(ConfigError::InvalidStoreUrl {
                url: self.store_url.clone(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue {
                field: "request_timeout_ms".to_string(),
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::ZeroValue {
                field: "event_channel_capacity".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    /// Store URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.store_url.trim_end_matches('/')
    }
}

fn parse_var(var: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
