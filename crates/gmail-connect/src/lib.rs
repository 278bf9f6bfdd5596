//! Gmail connection lifecycle.
//!
//! Links a Google account to the backend: acquire an OAuth token, register it
//! with the backend, confirm with a bounded handshake and only then persist
//! the connection locally. Disconnecting clears local state first and
//! revokes remotely on a best-effort basis.
//!
//! The [`ConnectionController`] drives the protocols over three seams:
//! [`CredentialProvider`], [`RegistrationClient`] and [`SessionStore`].

pub mod config;
pub mod controller;
pub mod error;
pub mod provider;
pub mod registration;
pub mod retry;
pub mod store;
pub mod types;

pub use config::ConnectConfig;
pub use controller::ConnectionController;
pub use error::{ConnectionError, ProviderError, RegistrationError, StoreError};
pub use provider::{CredentialProvider, GoogleCredentialProvider, ProviderConfig};
pub use registration::{HttpRegistrationClient, RegistrationClient};
pub use retry::RetryPolicy;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use types::{Credential, LifecycleState, SessionState};
