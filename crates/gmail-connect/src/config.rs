//! Client configuration from environment variables.

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::{ProviderConfig, DEFAULT_GOOGLE_TIMEOUT};
use crate::registration::DEFAULT_BACKEND_TIMEOUT;
use crate::retry::{RetryPolicy, DEFAULT_RETRY_DELAY, MAX_BACKOFF_FACTOR, MAX_HANDSHAKE_ATTEMPTS};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_SESSION_STORE_PATH: &str = "gmail_session.json";

#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Base URL of the registration backend
    pub backend_url: String,
    /// Where the session record is persisted
    pub session_store_path: PathBuf,
    /// Per-request limit for backend calls
    pub backend_timeout: Duration,
    pub provider: ProviderConfig,
    pub retry: RetryPolicy,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            session_store_path: PathBuf::from(DEFAULT_SESSION_STORE_PATH),
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            provider: ProviderConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ConnectConfig {
    /// Load configuration from the process environment.
    ///
    /// Everything is optional; the Google client id and secret are only
    /// needed once an interactive connect actually runs.
    ///
    /// - `BACKEND_URL`, `SESSION_STORE_PATH`, `BACKEND_TIMEOUT_SECS`
    /// - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `TOKEN_CACHE_PATH`, `GOOGLE_TIMEOUT_SECS`
    /// - `GOOGLE_USERINFO_URL`, `GOOGLE_REVOKE_URL`
    /// - `HANDSHAKE_MAX_ATTEMPTS`, `HANDSHAKE_RETRY_DELAY_MS`, `HANDSHAKE_BACKOFF_FACTOR`
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_vars<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = ProviderConfig::default();

        let max_attempts = match var("HANDSHAKE_MAX_ATTEMPTS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .context("HANDSHAKE_MAX_ATTEMPTS must be a positive integer")?,
            None => MAX_HANDSHAKE_ATTEMPTS,
        };
        if max_attempts > MAX_HANDSHAKE_ATTEMPTS {
            tracing::warn!(
                "HANDSHAKE_MAX_ATTEMPTS={} exceeds the limit, using {}",
                max_attempts,
                MAX_HANDSHAKE_ATTEMPTS
            );
        }

        let delay = match var("HANDSHAKE_RETRY_DELAY_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .context("HANDSHAKE_RETRY_DELAY_MS must be a number of milliseconds")?,
            ),
            None => DEFAULT_RETRY_DELAY,
        };

        let backoff = match var("HANDSHAKE_BACKOFF_FACTOR") {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .context("HANDSHAKE_BACKOFF_FACTOR must be a number")?,
            None => 1.0,
        };
        anyhow::ensure!(
            (1.0..=MAX_BACKOFF_FACTOR).contains(&backoff),
            "HANDSHAKE_BACKOFF_FACTOR must be between 1 and {}, got {}",
            MAX_BACKOFF_FACTOR,
            backoff
        );

        let timeout = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            let Some(raw) = var(key) else {
                return Ok(default);
            };
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", key))?;
            anyhow::ensure!(secs > 0, "{} must be greater than zero", key);
            Ok(Duration::from_secs(secs))
        };

        let provider = ProviderConfig {
            client_id: var("GOOGLE_CLIENT_ID"),
            client_secret: var("GOOGLE_CLIENT_SECRET"),
            token_cache_path: var("TOKEN_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.token_cache_path),
            userinfo_url: var("GOOGLE_USERINFO_URL").unwrap_or(defaults.userinfo_url),
            revoke_url: var("GOOGLE_REVOKE_URL").unwrap_or(defaults.revoke_url),
            scopes: defaults.scopes,
            request_timeout: timeout("GOOGLE_TIMEOUT_SECS", DEFAULT_GOOGLE_TIMEOUT)?,
        };

        Ok(Self {
            backend_url: var("BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            session_store_path: var("SESSION_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_STORE_PATH)),
            backend_timeout: timeout("BACKEND_TIMEOUT_SECS", DEFAULT_BACKEND_TIMEOUT)?,
            provider,
            retry: RetryPolicy::new(max_attempts, delay).with_backoff(backoff),
        })
    }
}
