//! Credential provider: wraps the platform identity service.
//!
//! The provider never retries. Prompting the user twice without them asking
//! for it is worse than failing.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::Credential;

mod google;

pub use google::{
    GoogleCredentialProvider, ProviderConfig, DEFAULT_GOOGLE_TIMEOUT, GMAIL_READONLY_SCOPE,
};

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain a bearer token. With `interactive == false` the user must not
    /// be prompted; only cached or silently refreshable tokens may be used.
    async fn acquire(&self, interactive: bool) -> Result<Credential, ProviderError>;

    /// Resolve the account email the credential belongs to.
    async fn resolve_identity(&self, credential: &Credential) -> Result<String, ProviderError>;

    /// Invalidate `credential` on the provider side and forget any cached copy.
    async fn revoke(&self, credential: &Credential) -> Result<(), ProviderError>;
}
