// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables at deploy time and read
//! once at startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Project ID that selects the in-memory store and mock token encryption.
pub const LOCAL_PROJECT_ID: &str = "local-dev";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// EVE SSO application client ID (public)
    pub esi_client_id: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// Public URL of this API (used for the SSO callback)
    pub api_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (KMS key location)
    pub gcp_region: String,
    /// Server port
    pub port: u16,
    /// ESI base URL, without trailing slash
    pub esi_base_url: String,
    /// User-Agent sent to ESI (CCP asks for contact info here)
    pub esi_user_agent: String,
    /// Background synchronization tuning
    pub processor: ProcessorConfig,

    // --- Secrets ---
    /// EVE SSO application secret
    pub esi_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth state parameter
    pub oauth_state_key: Vec<u8>,
}

/// Tuning knobs for the synchronization processor and refresh sweep.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Member IDs popped from the queue per poll.
    pub batch_size: usize,
    /// Maximum member passes running at once.
    pub max_concurrent: usize,
    /// Delay after every scope skip and every resolver call.
    pub scope_pacing: Duration,
    /// Sleep when the queue is empty.
    pub idle_backoff: Duration,
    /// Sleep after a queue error.
    pub error_backoff: Duration,
    /// Interval between refresh sweeps over all members.
    pub sweep_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrent: 10,
            scope_pacing: Duration::from_secs(1),
            idle_backoff: Duration::from_secs(5),
            error_backoff: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ProcessorConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: parse_or("SYNC_BATCH_SIZE", defaults.batch_size).max(1),
            max_concurrent: parse_or("SYNC_MAX_CONCURRENT", defaults.max_concurrent).max(1),
            scope_pacing: Duration::from_millis(parse_or("SYNC_SCOPE_PACING_MS", 1000)),
            idle_backoff: Duration::from_millis(parse_or("SYNC_IDLE_BACKOFF_MS", 5000)),
            error_backoff: Duration::from_millis(parse_or("SYNC_ERROR_BACKOFF_MS", 1000)),
            sweep_interval: Duration::from_secs(parse_or("SYNC_SWEEP_INTERVAL_SECS", 60)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            esi_client_id: env::var("ESI_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("ESI_CLIENT_ID"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID")
                .unwrap_or_else(|_| LOCAL_PROJECT_ID.to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            port: parse_or("PORT", 8080),
            esi_base_url: env::var("ESI_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://esi.evetech.net/latest".to_string()),
            esi_user_agent: env::var("ESI_USER_AGENT").unwrap_or_else(|_| {
                format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
            }),
            processor: ProcessorConfig::from_env(),

            esi_client_secret: env::var("ESI_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("ESI_CLIENT_SECRET"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
        })
    }

    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            esi_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: LOCAL_PROJECT_ID.to_string(),
            gcp_region: "us-west1".to_string(),
            port: 8080,
            esi_base_url: "http://127.0.0.1:9".to_string(),
            esi_user_agent: "capsuleer-sync-tests".to_string(),
            processor: ProcessorConfig {
                scope_pacing: Duration::ZERO,
                idle_backoff: Duration::from_millis(10),
                error_backoff: Duration::from_millis(10),
                ..ProcessorConfig::default()
            },
            esi_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
        }
    }

    /// True when running without GCP (in-memory store, mock KMS).
    pub fn is_local(&self) -> bool {
        self.gcp_project_id == LOCAL_PROJECT_ID
    }

    /// SSO callback URL registered with the EVE developer application.
    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.api_url.trim_end_matches('/'))
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("ESI_CLIENT_ID", "test_id");
        env::set_var("ESI_CLIENT_SECRET", " test_secret ");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("OAUTH_STATE_KEY", "state_key");
        env::set_var("SYNC_BATCH_SIZE", "25");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.esi_client_id, "test_id");
        assert_eq!(config.esi_client_secret, "test_secret");
        assert_eq!(config.processor.batch_size, 25);
        assert_eq!(config.processor.max_concurrent, 10);

        env::remove_var("SYNC_BATCH_SIZE");
    }

    #[test]
    fn test_default_processor_config_matches_documented_limits() {
        let config = ProcessorConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.scope_pacing, Duration::from_secs(1));
        assert_eq!(config.idle_backoff, Duration::from_secs(5));
        assert_eq!(config.error_backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_callback_url_strips_trailing_slash() {
        let mut config = Config::test_default();
        config.api_url = "https://api.example.com/".to_string();
        assert_eq!(config.callback_url(), "https://api.example.com/auth/callback");
    }
}
