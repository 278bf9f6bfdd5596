//! On-disk token vault.
//!
//! One directory per account under the vault root, named after the
//! percent-encoded address, each holding a single `token.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

const TOKEN_FILE: &str = "token.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenVault {
    root: PathBuf,
}

impl TokenVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Token file for `email`. Fails for addresses that would not map to a
    /// single directory directly under the vault root.
    pub fn token_path(&self, email: &str) -> io::Result<PathBuf> {
        let encoded = urlencoding::encode(email);
        let dir = self.root.join(encoded.as_ref());

        let confined = !matches!(encoded.as_ref(), "" | "." | "..")
            && dir.parent() == Some(self.root.as_path())
            && dir.components().count() == self.root.components().count() + 1;
        if !confined {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("address {:?} does not map into the token directory", email),
            ));
        }

        Ok(dir.join(TOKEN_FILE))
    }

    /// Store (or replace) the token for `email`.
    pub async fn store(&self, email: &str, token: &str) -> io::Result<()> {
        let path = self.token_path(email)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let record = StoredToken {
            token: token.to_string(),
            stored_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&path, json).await?;

        tracing::debug!("Token written to {}", path.display());
        Ok(())
    }

    pub async fn load(&self, email: &str) -> io::Result<Option<StoredToken>> {
        match tokio::fs::read(self.token_path(email)?).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove the token for `email`. Returns whether one existed.
    pub async fn remove(&self, email: &str) -> io::Result<bool> {
        match tokio::fs::remove_file(self.token_path(email)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
