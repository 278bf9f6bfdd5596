//! Core value types: the credential, the persisted session record and the
//! lifecycle states observed by the presentation layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque OAuth bearer token.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Credential(token.into())
    }

    /// The raw token, for putting on the wire.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Credential(token)
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Credential(token.to_string())
    }
}

/// The persisted connection record.
///
/// Serialized with the key names the rest of the system reads:
/// `isConnected`, `userEmail`, `gmailToken`. The three are always written
/// and cleared together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gmail_token: Option<Credential>,
}

impl SessionState {
    /// A record asserting a registered connection for `email`.
    pub fn connected(email: impl Into<String>, credential: Credential) -> Self {
        Self {
            is_connected: true,
            user_email: Some(email.into()),
            gmail_token: Some(credential),
        }
    }

    /// True only when the record claims a connection and carries both the
    /// account and the credential.
    pub fn is_valid_connection(&self) -> bool {
        self.is_connected && self.user_email.is_some() && self.gmail_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_connected && self.user_email.is_none() && self.gmail_token.is_none()
    }
}

/// States of the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Disconnected,
    Acquiring,
    Registering,
    Handshaking,
    Connected,
    Disconnecting,
}

impl LifecycleState {
    /// Stable states accept new connect/disconnect requests.
    pub fn is_idle(&self) -> bool {
        matches!(self, LifecycleState::Disconnected | LifecycleState::Connected)
    }

    pub fn as_str(&self) -> &str {
        match self {
            LifecycleState::Disconnected => "disconnected",
            LifecycleState::Acquiring => "acquiring",
            LifecycleState::Registering => "registering",
            LifecycleState::Handshaking => "handshaking",
            LifecycleState::Connected => "connected",
            LifecycleState::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("tok_abc");
        assert_eq!(format!("{:?}", credential), "Credential(<redacted>)");
        assert_eq!(credential.secret(), "tok_abc");
    }

    #[test]
    fn test_session_state_uses_persisted_key_names() {
        let state = SessionState::connected("user@example.com", Credential::new("tok_abc"));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "isConnected": true,
                "userEmail": "user@example.com",
                "gmailToken": "tok_abc",
            })
        );
    }

    #[test]
    fn test_empty_session_serializes_without_account_keys() {
        let json = serde_json::to_value(SessionState::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "isConnected": false }));
    }

    #[test]
    fn test_connection_claim_without_token_is_invalid() {
        let state = SessionState {
            is_connected: true,
            user_email: Some("user@example.com".to_string()),
            gmail_token: None,
        };
        assert!(!state.is_valid_connection());
        assert!(!state.is_empty());
    }

    #[test]
    fn test_idle_states() {
        assert!(LifecycleState::Disconnected.is_idle());
        assert!(LifecycleState::Connected.is_idle());
        assert!(!LifecycleState::Handshaking.is_idle());
        assert!(!LifecycleState::Disconnecting.is_idle());
    }
}
