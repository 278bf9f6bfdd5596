//! Backend registration client.
//!
//! Three independent calls against the backend, one round trip each. Retry
//! policy lives in the controller, never here.

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use shared_types::{ConnectAck, ErrorDetail, LogoutRequest, TokenRequest};

use crate::error::RegistrationError;
use crate::types::Credential;

pub const STORE_TOKEN_PATH: &str = "/store-gmail-token";
pub const CONNECT_PATH: &str = "/connect-gmail";
pub const LOGOUT_PATH: &str = "/logout-gmail";

/// Upper bound on a single backend round trip.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait RegistrationClient: Send + Sync {
    /// Hand the token to the backend for storage.
    async fn store_token(&self, account: &str, credential: &Credential)
        -> Result<(), RegistrationError>;

    /// Ask the backend to finalize the connection.
    async fn handshake(
        &self,
        account: &str,
        credential: &Credential,
    ) -> Result<ConnectAck, RegistrationError>;

    /// Tell the backend the account logged out.
    async fn revoke_session(&self, account: &str) -> Result<(), RegistrationError>;
}

/// JSON-over-HTTP implementation.
pub struct HttpRegistrationClient {
    http: Client,
    base_url: String,
}

impl HttpRegistrationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RegistrationError> {
        Self::with_timeout(base_url, DEFAULT_BACKEND_TIMEOUT)
    }

    /// A request that gets no response within `timeout` fails as a
    /// transport error.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RegistrationError> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token_request(account: &str, credential: &Credential) -> TokenRequest {
        TokenRequest {
            email: account.to_string(),
            token: credential.secret().to_string(),
        }
    }
}

/// Pull the `detail` field out of an error body, falling back to the raw
/// text or the status line.
async fn error_detail(response: Response) -> (u16, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let detail = match serde_json::from_str::<ErrorDetail>(&body) {
        Ok(parsed) => parsed.detail,
        Err(_) if !body.trim().is_empty() => body,
        Err(_) => status.to_string(),
    };

    (status.as_u16(), detail)
}

#[async_trait]
impl RegistrationClient for HttpRegistrationClient {
    async fn store_token(
        &self,
        account: &str,
        credential: &Credential,
    ) -> Result<(), RegistrationError> {
        let response = self
            .http
            .post(self.url(STORE_TOKEN_PATH))
            .json(&Self::token_request(account, credential))
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, detail) = error_detail(response).await;
            tracing::warn!("Token storage for {} rejected: {} - {}", account, status, detail);
            return Err(RegistrationError::RegistrationRejected { status, detail });
        }

        tracing::debug!("Token stored for {}", account);
        Ok(())
    }

    async fn handshake(
        &self,
        account: &str,
        credential: &Credential,
    ) -> Result<ConnectAck, RegistrationError> {
        let response = self
            .http
            .post(self.url(CONNECT_PATH))
            .json(&Self::token_request(account, credential))
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, detail) = error_detail(response).await;
            return Err(RegistrationError::HandshakeRejected { status, detail });
        }

        let body = response.text().await?;
        let ack = if body.trim().is_empty() {
            ConnectAck::default()
        } else {
            match serde_json::from_str(&body) {
                Ok(ack) => ack,
                Err(_) => ConnectAck(serde_json::Value::String(body)),
            }
        };

        Ok(ack)
    }

    async fn revoke_session(&self, account: &str) -> Result<(), RegistrationError> {
        let response = self
            .http
            .post(self.url(LOGOUT_PATH))
            .json(&LogoutRequest {
                email: account.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, detail) = error_detail(response).await;
            return Err(RegistrationError::RevokeNotified { status, detail });
        }

        Ok(())
    }
}
