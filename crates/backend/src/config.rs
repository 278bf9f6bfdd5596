use anyhow::Context;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub port: u16,
    /// Root directory of the token vault
    pub token_dir: PathBuf,
    /// Comma-separated origin list; permissive CORS when unset
    pub cors_allowed_origins: Option<String>,
}

impl BackendConfig {
    /// Load configuration from environment variables.
    ///
    /// - `PORT` (default 8000)
    /// - `TOKEN_DIR` (default `credentials`)
    /// - `CORS_ALLOWED_ORIGINS`
    pub fn from_env() -> anyhow::Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.trim().parse().context("PORT must be a valid port number")?,
            Err(_) => 8000,
        };

        Ok(Self {
            port,
            token_dir: std::env::var("TOKEN_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("credentials")),
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS").ok(),
        })
    }
}
