//! Wire types shared between the connection client and the backend.
//!
//! Field names follow the backend's JSON contract, so these structs are
//! serialized as-is onto the wire.

use serde::{Deserialize, Serialize};

mod validation;

pub use validation::{validate_gmail_address, AddressError};

/// Body of `POST /store-gmail-token` and `POST /connect-gmail`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub token: String,
}

// Hand-written so the token never ends up in logs.
impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /logout-gmail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    pub email: String,
}

/// Error body returned by the backend on any non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Generic success body used by the backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

/// Acknowledgement returned by a successful handshake.
///
/// The backend is free to send any JSON body, so the raw value is kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectAck(pub serde_json::Value);

impl ConnectAck {
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

/// Subset of the Google userinfo response we care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub verified_email: Option<bool>,
}
