//! Google OAuth credential provider.
//!
//! Tokens come from yup-oauth2's installed-app flow and are cached on disk,
//! so a second acquisition is silent. Identity lookup and revocation are
//! plain HTTPS calls.

use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::{ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use shared_types::UserInfo;

use super::CredentialProvider;
use crate::error::ProviderError;
use crate::types::Credential;

pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

pub const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const DEFAULT_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
pub const DEFAULT_GOOGLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`GoogleCredentialProvider`].
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Where yup-oauth2 persists the token between runs
    pub token_cache_path: PathBuf,
    pub userinfo_url: String,
    pub revoke_url: String,
    pub scopes: Vec<String>,
    /// Applies to userinfo and revoke requests
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_cache_path: PathBuf::from("gmail_token_cache.json"),
            userinfo_url: DEFAULT_USERINFO_URL.to_string(),
            revoke_url: DEFAULT_REVOKE_URL.to_string(),
            scopes: vec![GMAIL_READONLY_SCOPE.to_string()],
            request_timeout: DEFAULT_GOOGLE_TIMEOUT,
        }
    }
}

pub struct GoogleCredentialProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl GoogleCredentialProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ProviderError::AuthUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, http })
    }

    fn application_secret(&self) -> Result<ApplicationSecret, ProviderError> {
        let client_id = self.config.client_id.clone().ok_or_else(|| {
            ProviderError::AuthUnavailable("GOOGLE_CLIENT_ID is not configured".to_string())
        })?;
        let client_secret = self.config.client_secret.clone().ok_or_else(|| {
            ProviderError::AuthUnavailable("GOOGLE_CLIENT_SECRET is not configured".to_string())
        })?;

        Ok(ApplicationSecret {
            client_id,
            client_secret,
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            redirect_uris: vec!["http://localhost".to_string()],
            ..Default::default()
        })
    }

    async fn forget_cached_token(&self) {
        match tokio::fs::remove_file(&self.config.token_cache_path).await {
            Ok(()) => tracing::debug!(
                "Removed token cache {}",
                self.config.token_cache_path.display()
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove token cache {}: {}",
                self.config.token_cache_path.display(),
                e
            ),
        }
    }
}

/// Delegate that refuses to show the consent page, turning a would-be
/// prompt into an error.
struct NoPromptDelegate;

impl InstalledFlowDelegate for NoPromptDelegate {
    fn present_user_url<'a>(
        &'a self,
        _url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async { Err("user consent required but prompting is disabled".to_string()) })
    }
}

#[async_trait]
impl CredentialProvider for GoogleCredentialProvider {
    async fn acquire(&self, interactive: bool) -> Result<Credential, ProviderError> {
        let secret = self.application_secret()?;

        if !interactive && !self.config.token_cache_path.exists() {
            return Err(ProviderError::AuthUnavailable(
                "no cached Google token".to_string(),
            ));
        }

        // The interactive return method is the one that propagates a
        // delegate refusal instead of waiting on the redirect listener.
        let method = if interactive {
            InstalledFlowReturnMethod::HTTPRedirect
        } else {
            InstalledFlowReturnMethod::Interactive
        };

        let mut builder = InstalledFlowAuthenticator::builder(secret, method)
            .persist_tokens_to_disk(self.config.token_cache_path.clone());
        if !interactive {
            builder = builder.flow_delegate(Box::new(NoPromptDelegate));
        }

        let auth = builder.build().await.map_err(|e| {
            ProviderError::AuthUnavailable(format!("Failed to build authenticator: {}", e))
        })?;

        if interactive {
            tracing::info!("Requesting Google authorization (a browser prompt may open)");
        }

        let token = auth
            .token(&self.config.scopes)
            .await
            .map_err(|e| match e {
                yup_oauth2::Error::AuthError(e) => ProviderError::AuthDenied(e.to_string()),
                yup_oauth2::Error::UserError(msg) if interactive => ProviderError::AuthDenied(msg),
                other => ProviderError::AuthUnavailable(other.to_string()),
            })?;

        let access = token.token().ok_or_else(|| {
            ProviderError::AuthUnavailable("provider returned no access token".to_string())
        })?;

        Ok(Credential::new(access))
    }

    async fn resolve_identity(&self, credential: &Credential) -> Result<String, ProviderError> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(credential.secret())
            .send()
            .await
            .map_err(|e| ProviderError::AuthUnavailable(format!("Failed to get user info: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::AuthDenied(format!(
                "user info request was refused ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::AuthUnavailable(format!(
                "user info request failed ({})",
                status
            )));
        }

        let info: UserInfo = response.json().await.map_err(|e| {
            ProviderError::AuthUnavailable(format!("Invalid user info response: {}", e))
        })?;

        if info.email.trim().is_empty() {
            return Err(ProviderError::AuthUnavailable(
                "user info response has no email".to_string(),
            ));
        }

        tracing::debug!("Resolved Google account {}", info.email);
        Ok(info.email)
    }

    async fn revoke(&self, credential: &Credential) -> Result<(), ProviderError> {
        // Forget the local copy first; a failed remote revoke must not leave
        // a token behind that the next non-interactive acquire would reuse.
        self.forget_cached_token().await;

        let response = self
            .http
            .post(&self.config.revoke_url)
            .form(&[("token", credential.secret())])
            .send()
            .await
            .map_err(|e| ProviderError::RevokeFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RevokeFailed(format!("{} - {}", status, body)));
        }

        Ok(())
    }
}
