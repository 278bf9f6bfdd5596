//! Error taxonomy for the connection lifecycle.
//!
//! Each collaborator has its own error enum; the controller folds them into
//! [`ConnectionError`], which is what the presentation layer sees.

use thiserror::Error;

/// Failures from the platform identity service.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The user refused consent, or the provider rejected the grant
    #[error("Authorization denied: {0}")]
    AuthDenied(String),

    /// No credential could be obtained without prompting, or the provider
    /// could not be reached
    #[error("Authorization unavailable: {0}")]
    AuthUnavailable(String),

    /// Provider-side revocation did not succeed
    #[error("Token revocation failed: {0}")]
    RevokeFailed(String),
}

/// Failures from a single backend round trip.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// `store-gmail-token` answered with a non-2xx status
    #[error("Backend rejected token storage ({status}): {detail}")]
    RegistrationRejected { status: u16, detail: String },

    /// `connect-gmail` answered with a non-2xx status
    #[error("Backend rejected handshake ({status}): {detail}")]
    HandshakeRejected { status: u16, detail: String },

    /// `logout-gmail` answered with a non-2xx status
    #[error("Backend was not notified of logout ({status}): {detail}")]
    RevokeNotified { status: u16, detail: String },

    /// The request never produced a response
    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RegistrationError {
    /// Human-readable detail suitable for surfacing to the user.
    pub fn detail(&self) -> String {
        match self {
            RegistrationError::RegistrationRejected { detail, .. }
            | RegistrationError::HandshakeRejected { detail, .. }
            | RegistrationError::RevokeNotified { detail, .. } => detail.clone(),
            RegistrationError::Transport(e) => e.to_string(),
        }
    }
}

/// Failures reading or writing the persisted session record.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a failed connect or disconnect, as reported to the UI.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Authorization denied: {0}")]
    AuthDenied(String),

    #[error("Authorization unavailable: {0}")]
    AuthUnavailable(String),

    /// The backend refused to store the token; not retried
    #[error("Token registration rejected: {detail}")]
    RegistrationRejected { detail: String },

    /// Every handshake attempt failed
    #[error("Handshake failed after {attempts} attempts: {last_error}")]
    HandshakeExhausted {
        attempts: u32,
        #[source]
        last_error: RegistrationError,
    },

    /// The request does not make sense in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Another connect or disconnect is still running
    #[error("A connection operation is already in progress")]
    OperationInProgress,

    /// The caller stopped waiting before the handshake completed
    #[error("Connection attempt abandoned")]
    Abandoned,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ProviderError> for ConnectionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::AuthDenied(msg) => ConnectionError::AuthDenied(msg),
            ProviderError::AuthUnavailable(msg) => ConnectionError::AuthUnavailable(msg),
            // Revocation only happens on disconnect, where it is swallowed.
            ProviderError::RevokeFailed(msg) => ConnectionError::AuthUnavailable(msg),
        }
    }
}

impl ConnectionError {
    /// Whether pressing the button again might succeed.
    pub fn is_user_recoverable(&self) -> bool {
        !matches!(
            self,
            ConnectionError::InvalidState(_) | ConnectionError::Store(_)
        )
    }
}
