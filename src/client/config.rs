//! Session gateway configuration.
//!
//! Reads CRM_API_URL, CRM_REQUEST_TIMEOUT_SECS and CRM_EXPIRY_SKEW_SECS.

use std::time::Duration;

/// Default API base URL
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Seconds before the known expiry at which an access token is treated as expired
const DEFAULT_EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub expiry_skew_secs: i64,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from environment variables, keeping defaults for anything unset or unparsable
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            base_url: std::env::var("CRM_API_URL").unwrap_or(defaults.base_url),
            request_timeout: std::env::var("CRM_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            expiry_skew_secs: std::env::var("CRM_EXPIRY_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.expiry_skew_secs),
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn expiry_skew(mut self, secs: i64) -> Self {
        self.expiry_skew_secs = secs;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            expiry_skew_secs: DEFAULT_EXPIRY_SKEW_SECS,
        }
    }
}
