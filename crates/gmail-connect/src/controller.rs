//! Connection lifecycle controller.
//!
//! Orchestrates the credential provider, the backend registration client
//! and the session store into the connect and disconnect protocols:
//!
//! ```text
//! Disconnected -> Acquiring -> Registering -> Handshaking -> Connected
//! Connected -> Disconnecting -> Disconnected
//! ```
//!
//! Any failure on the way up lands back in `Disconnected`. The session store
//! is only told about a connection after the handshake succeeded, and is
//! cleared before any remote revocation is attempted on the way down.
//!
//! Only one protocol runs at a time; a request that arrives while another is
//! in flight gets [`ConnectionError::OperationInProgress`]. State changes are
//! published on a `tokio::sync::watch` channel for the presentation layer.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{ConnectionError, StoreError};
use crate::provider::CredentialProvider;
use crate::registration::RegistrationClient;
use crate::retry::{self, RetryPolicy};
use crate::store::SessionStore;
use crate::types::{Credential, LifecycleState, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Connect,
    Disconnect,
}

/// Holds the lifecycle in a transient state for the duration of a protocol.
///
/// If the protocol returns early or its future is dropped, the state falls
/// back to `on_abort`.
struct Transition<'a> {
    state: &'a watch::Sender<LifecycleState>,
    on_abort: LifecycleState,
    finished: bool,
}

impl Transition<'_> {
    fn advance(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        tracing::info!("Connection state: {} -> {}", previous, next);
    }

    fn abort_to(&mut self, state: LifecycleState) {
        self.on_abort = state;
    }

    fn finish(mut self, last: LifecycleState) {
        self.finished = true;
        self.advance(last);
    }

    /// Leave the state as it is; whoever holds it next settles it.
    fn release(mut self) {
        self.finished = true;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.advance(self.on_abort);
        }
    }
}

pub struct ConnectionController {
    provider: Arc<dyn CredentialProvider>,
    registration: Arc<dyn RegistrationClient>,
    store: Arc<dyn SessionStore>,
    retry: RetryPolicy,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl ConnectionController {
    /// Build a controller whose initial state reflects the persisted session.
    ///
    /// A record that claims a connection but lacks the account or the token
    /// is not trusted; the controller starts `Disconnected`.
    pub async fn restore(
        provider: Arc<dyn CredentialProvider>,
        registration: Arc<dyn RegistrationClient>,
        store: Arc<dyn SessionStore>,
        retry: RetryPolicy,
    ) -> Result<Self, ConnectionError> {
        let session = store.load().await?;

        let initial = if session.is_valid_connection() {
            tracing::info!(
                "Restored Gmail connection for {}",
                session.user_email.as_deref().unwrap_or_default()
            );
            LifecycleState::Connected
        } else {
            if session.is_connected {
                tracing::warn!("Persisted session claims a connection without credentials, ignoring");
            }
            LifecycleState::Disconnected
        };

        let (state, _) = watch::channel(initial);

        Ok(Self {
            provider,
            registration,
            store,
            retry,
            state: Arc::new(state),
        })
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receive every state change from now on.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Current persisted record.
    pub async fn session(&self) -> Result<SessionState, ConnectionError> {
        Ok(self.store.load().await?)
    }

    /// Run the connect protocol. Returns the connected account on success.
    pub async fn connect(&self) -> Result<String, ConnectionError> {
        self.connect_until(std::future::pending::<()>()).await
    }

    /// Run the connect protocol, abandoning it if `cancel` completes before
    /// the handshake does. An abandoned attempt commits nothing.
    pub async fn connect_until<F>(&self, cancel: F) -> Result<String, ConnectionError>
    where
        F: Future<Output = ()>,
    {
        let transition = self.begin(Operation::Connect)?;

        let registered = tokio::select! {
            result = self.register(&transition) => result,
            _ = cancel => Err(ConnectionError::Abandoned),
        };

        let result = match registered {
            Ok((account, credential)) => self.commit(transition, account, credential).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::error!("Gmail connection failed: {}", e);
        }
        result
    }

    /// Run the disconnect protocol. Returns the account that was disconnected.
    ///
    /// Once the local record is cleared the outcome is success, whatever the
    /// provider or the backend say about revocation.
    pub async fn disconnect(&self) -> Result<String, ConnectionError> {
        let mut transition = self.begin(Operation::Disconnect)?;

        let session = self.store.load().await?;
        let Some(account) = session.user_email.clone() else {
            // The store is authoritative; there is no session to tear down.
            transition.finish(LifecycleState::Disconnected);
            return Err(ConnectionError::InvalidState(
                "no connected account in the session store".to_string(),
            ));
        };

        self.store.clear().await.map_err(|e| {
            tracing::error!("Failed to clear session for {}: {}", account, e);
            e
        })?;
        transition.abort_to(LifecycleState::Disconnected);
        tracing::info!("Cleared local session for {}", account);

        if let Some(credential) = &session.gmail_token {
            if let Err(e) = self.provider.revoke(credential).await {
                tracing::warn!("Provider token revocation for {} failed: {}", account, e);
            }
        }

        if let Err(e) = self.registration.revoke_session(&account).await {
            tracing::warn!("Backend logout notification for {} failed: {}", account, e);
        }

        transition.finish(LifecycleState::Disconnected);
        tracing::info!("Disconnected Gmail account {}", account);
        Ok(account)
    }

    /// Enter the first transient state of `op`, or explain why not.
    fn begin(&self, op: Operation) -> Result<Transition<'_>, ConnectionError> {
        let mut outcome = Err(ConnectionError::OperationInProgress);
        let mut entered = None;

        self.state.send_if_modified(|current| {
            let (next, abort) = match (op, *current) {
                (Operation::Connect, LifecycleState::Disconnected) => {
                    (LifecycleState::Acquiring, LifecycleState::Disconnected)
                }
                (Operation::Disconnect, LifecycleState::Connected) => {
                    (LifecycleState::Disconnecting, LifecycleState::Connected)
                }
                (Operation::Connect, LifecycleState::Connected) => {
                    outcome = Err(ConnectionError::InvalidState(
                        "already connected; disconnect first".to_string(),
                    ));
                    return false;
                }
                (Operation::Disconnect, LifecycleState::Disconnected) => {
                    outcome = Err(ConnectionError::InvalidState(
                        "not connected; nothing to disconnect".to_string(),
                    ));
                    return false;
                }
                _ => return false,
            };

            entered = Some((*current, next));
            *current = next;
            outcome = Ok(abort);
            true
        });

        let on_abort = outcome?;
        if let Some((previous, next)) = entered {
            tracing::info!("Connection state: {} -> {}", previous, next);
        }

        Ok(Transition {
            state: &self.state,
            on_abort,
            finished: false,
        })
    }

    /// Acquire, identify, store the token and handshake. Nothing is
    /// persisted locally here.
    async fn register(
        &self,
        transition: &Transition<'_>,
    ) -> Result<(String, Credential), ConnectionError> {
        let credential = self.provider.acquire(true).await?;
        let account = self.provider.resolve_identity(&credential).await?;
        tracing::info!("Authorized Google account {}", account);

        transition.advance(LifecycleState::Registering);
        self.registration
            .store_token(&account, &credential)
            .await
            .map_err(|e| ConnectionError::RegistrationRejected { detail: e.detail() })?;

        transition.advance(LifecycleState::Handshaking);
        let registration = &self.registration;
        let ack = retry::run_handshake(&self.retry, &account, &credential, |attempt| {
            registration.handshake(attempt.account, attempt.credential)
        })
        .await
        .map_err(|exhausted| ConnectionError::HandshakeExhausted {
            attempts: exhausted.attempts,
            last_error: exhausted.last_error,
        })?;
        tracing::debug!("Handshake acknowledged for {}: {:?}", account, ack);

        Ok((account, credential))
    }

    /// The single point where a connection is persisted.
    ///
    /// The write and the final state change run on their own task, so a
    /// caller that stops waiting cannot leave the published state behind
    /// what the store holds. Until that task settles the state stays
    /// `Handshaking` and new requests are refused.
    async fn commit(
        &self,
        transition: Transition<'_>,
        account: String,
        credential: Credential,
    ) -> Result<String, ConnectionError> {
        let session = SessionState::connected(account.clone(), credential);
        let store = self.store.clone();
        let state = self.state.clone();
        transition.release();

        let write = tokio::spawn(async move {
            let saved = store.save(&session).await;
            let next = match saved {
                Ok(()) => LifecycleState::Connected,
                Err(_) => LifecycleState::Disconnected,
            };
            let previous = state.send_replace(next);
            tracing::info!("Connection state: {} -> {}", previous, next);
            saved
        });

        match write.await {
            Ok(saved) => saved?,
            Err(e) => {
                self.state.send_replace(LifecycleState::Disconnected);
                return Err(StoreError::Unavailable(format!("session write aborted: {}", e)).into());
            }
        }

        tracing::info!("Connected Gmail account {}", account);
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, RegistrationError};
    use crate::store::MemorySessionStore;
    use async_trait::async_trait;
    use shared_types::ConnectAck;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    const ACCOUNT: &str = "user@example.com";
    const TOKEN: &str = "tok_abc";

    #[derive(Default)]
    struct MockProvider {
        deny: AtomicBool,
        fail_identity: AtomicBool,
        fail_revoke: AtomicBool,
        acquire_calls: AtomicU32,
        revoke_calls: AtomicU32,
        /// When set, acquire waits for a notification before returning.
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl CredentialProvider for MockProvider {
        async fn acquire(&self, interactive: bool) -> Result<Credential, ProviderError> {
            assert!(interactive, "connect must acquire interactively");
            self.acquire_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.deny.load(Ordering::SeqCst) {
                return Err(ProviderError::AuthDenied("user declined".to_string()));
            }
            Ok(Credential::new(TOKEN))
        }

        async fn resolve_identity(&self, _credential: &Credential) -> Result<String, ProviderError> {
            if self.fail_identity.load(Ordering::SeqCst) {
                return Err(ProviderError::AuthUnavailable("userinfo down".to_string()));
            }
            Ok(ACCOUNT.to_string())
        }

        async fn revoke(&self, _credential: &Credential) -> Result<(), ProviderError> {
            self.revoke_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_revoke.load(Ordering::SeqCst) {
                return Err(ProviderError::RevokeFailed("provider exploded".to_string()));
            }
            Ok(())
        }
    }

    /// Scripted backend: `handshake_failures` leading handshakes fail.
    #[derive(Default)]
    struct MockBackend {
        reject_store: Option<String>,
        handshake_failures: u32,
        fail_logout: bool,
        store_calls: AtomicU32,
        handshake_calls: AtomicU32,
        logout_calls: AtomicU32,
        /// Snapshot of the store's connection flag at each handshake.
        observed: Mutex<Vec<bool>>,
        store: Option<Arc<MemorySessionStore>>,
    }

    impl MockBackend {
        fn network_calls(&self) -> u32 {
            self.store_calls.load(Ordering::SeqCst)
                + self.handshake_calls.load(Ordering::SeqCst)
                + self.logout_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RegistrationClient for MockBackend {
        async fn store_token(
            &self,
            account: &str,
            credential: &Credential,
        ) -> Result<(), RegistrationError> {
            assert_eq!(account, ACCOUNT);
            assert_eq!(credential.secret(), TOKEN);
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            match &self.reject_store {
                Some(detail) => Err(RegistrationError::RegistrationRejected {
                    status: 400,
                    detail: detail.clone(),
                }),
                None => Ok(()),
            }
        }

        async fn handshake(
            &self,
            _account: &str,
            _credential: &Credential,
        ) -> Result<ConnectAck, RegistrationError> {
            if let Some(store) = &self.store {
                self.observed
                    .lock()
                    .unwrap()
                    .push(store.snapshot().is_connected);
            }
            let n = self.handshake_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.handshake_failures {
                return Err(RegistrationError::HandshakeRejected {
                    status: 500,
                    detail: format!("handshake {} failed", n),
                });
            }
            Ok(ConnectAck(serde_json::json!({ "ack": true })))
        }

        async fn revoke_session(&self, account: &str) -> Result<(), RegistrationError> {
            assert_eq!(account, ACCOUNT);
            self.logout_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_logout {
                return Err(RegistrationError::RevokeNotified {
                    status: 503,
                    detail: "backend down".to_string(),
                });
            }
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10))
    }

    async fn controller(
        provider: Arc<MockProvider>,
        backend: Arc<MockBackend>,
        store: Arc<MemorySessionStore>,
    ) -> ConnectionController {
        ConnectionController::restore(provider, backend, store, fast_retry())
            .await
            .unwrap()
    }

    fn connected_store() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::with_state(SessionState::connected(
            ACCOUNT,
            Credential::new(TOKEN),
        )))
    }

    #[tokio::test]
    async fn test_connect_retries_handshake_then_commits() {
        let store = Arc::new(MemorySessionStore::new());
        let provider = Arc::new(MockProvider::default());
        let backend = Arc::new(MockBackend {
            handshake_failures: 1,
            ..Default::default()
        });
        let ctl = controller(provider, backend.clone(), store.clone()).await;

        let account = ctl.connect().await.unwrap();

        assert_eq!(account, ACCOUNT);
        assert_eq!(ctl.state(), LifecycleState::Connected);
        assert_eq!(backend.store_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.handshake_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            store.snapshot(),
            SessionState::connected(ACCOUNT, Credential::new(TOKEN))
        );
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_connect_succeeds_on_final_attempt() {
        let store = Arc::new(MemorySessionStore::new());
        let backend = Arc::new(MockBackend {
            handshake_failures: 2,
            ..Default::default()
        });
        let ctl = controller(Arc::new(MockProvider::default()), backend.clone(), store.clone()).await;

        ctl.connect().await.unwrap();

        assert_eq!(backend.handshake_calls.load(Ordering::SeqCst), 3);
        assert_eq!(ctl.state(), LifecycleState::Connected);
        assert!(store.snapshot().is_connected);
    }

    #[tokio::test]
    async fn test_handshake_exhaustion_discards_credential() {
        let store = Arc::new(MemorySessionStore::new());
        let backend = Arc::new(MockBackend {
            handshake_failures: u32::MAX,
            ..Default::default()
        });
        let ctl = controller(Arc::new(MockProvider::default()), backend.clone(), store.clone()).await;

        let err = ctl.connect().await.unwrap_err();

        match err {
            ConnectionError::HandshakeExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.detail(), "handshake 3 failed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(backend.handshake_calls.load(Ordering::SeqCst), 3);
        assert_eq!(ctl.state(), LifecycleState::Disconnected);
        assert!(store.snapshot().is_empty());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_store_token_rejection_skips_handshake() {
        let store = Arc::new(MemorySessionStore::new());
        let backend = Arc::new(MockBackend {
            reject_store: Some("bad token".to_string()),
            ..Default::default()
        });
        let ctl = controller(Arc::new(MockProvider::default()), backend.clone(), store.clone()).await;

        let err = ctl.connect().await.unwrap_err();

        assert!(matches!(err, ConnectionError::RegistrationRejected { ref detail } if detail == "bad token"));
        assert!(err.to_string().contains("bad token"));
        assert_eq!(backend.store_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.handshake_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.snapshot(), SessionState::default());
        assert_eq!(store.writes(), 0);
        assert_eq!(ctl.state(), LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn test_auth_denied_touches_nothing() {
        let store = Arc::new(MemorySessionStore::new());
        let provider = Arc::new(MockProvider::default());
        provider.deny.store(true, Ordering::SeqCst);
        let backend = Arc::new(MockBackend::default());
        let ctl = controller(provider, backend.clone(), store.clone()).await;

        let err = ctl.connect().await.unwrap_err();

        assert!(matches!(err, ConnectionError::AuthDenied(_)));
        assert_eq!(backend.network_calls(), 0);
        assert_eq!(store.writes(), 0);
        assert_eq!(ctl.state(), LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn test_identity_failure_aborts_like_auth_failure() {
        let store = Arc::new(MemorySessionStore::new());
        let provider = Arc::new(MockProvider::default());
        provider.fail_identity.store(true, Ordering::SeqCst);
        let backend = Arc::new(MockBackend::default());
        let ctl = controller(provider, backend.clone(), store.clone()).await;

        let err = ctl.connect().await.unwrap_err();

        assert!(matches!(err, ConnectionError::AuthUnavailable(_)));
        assert_eq!(backend.network_calls(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_never_connected_before_handshake_success() {
        let store = Arc::new(MemorySessionStore::new());
        let backend = Arc::new(MockBackend {
            handshake_failures: 2,
            store: Some(store.clone()),
            ..Default::default()
        });
        let ctl = controller(Arc::new(MockProvider::default()), backend.clone(), store.clone()).await;

        ctl.connect().await.unwrap();

        assert_eq!(*backend.observed.lock().unwrap(), vec![false, false, false]);
        assert!(store.snapshot().is_connected);
    }

    #[tokio::test]
    async fn test_commit_failure_reverts_to_disconnected() {
        let store = Arc::new(MemorySessionStore::new());
        store.set_fail_writes(true);
        let ctl = controller(
            Arc::new(MockProvider::default()),
            Arc::new(MockBackend::default()),
            store.clone(),
        )
        .await;

        let err = ctl.connect().await.unwrap_err();

        assert!(matches!(err, ConnectionError::Store(_)));
        assert_eq!(ctl.state(), LifecycleState::Disconnected);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_transitions_are_published_in_order() {
        let store = Arc::new(MemorySessionStore::new());
        let backend = Arc::new(MockBackend {
            handshake_failures: 1,
            ..Default::default()
        });
        let ctl = Arc::new(controller(Arc::new(MockProvider::default()), backend, store).await);

        let mut rx = ctl.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_task = seen.clone();
        let watcher = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                seen_task.lock().unwrap().push(state);
                if state == LifecycleState::Connected {
                    break;
                }
            }
        });

        ctl.connect().await.unwrap();
        watcher.await.unwrap();

        // watch only guarantees the latest value, but every state must be
        // seen in order with Connected last.
        let seen = seen.lock().unwrap().clone();
        let order = [
            LifecycleState::Acquiring,
            LifecycleState::Registering,
            LifecycleState::Handshaking,
            LifecycleState::Connected,
        ];
        let positions: Vec<usize> = seen
            .iter()
            .map(|s| order.iter().position(|o| o == s).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", seen);
        assert_eq!(seen.last(), Some(&LifecycleState::Connected));
    }

    #[tokio::test]
    async fn test_concurrent_connect_is_rejected() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(MockProvider {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let backend = Arc::new(MockBackend::default());
        let store = Arc::new(MemorySessionStore::new());
        let ctl = Arc::new(controller(provider.clone(), backend.clone(), store).await);

        let first = {
            let ctl = ctl.clone();
            tokio::spawn(async move { ctl.connect().await })
        };

        // Wait until the first connect is parked inside acquire.
        while provider.acquire_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(ctl.state(), LifecycleState::Acquiring);

        let second = ctl.connect().await;
        assert!(matches!(second, Err(ConnectionError::OperationInProgress)));
        assert!(matches!(
            ctl.disconnect().await,
            Err(ConnectionError::OperationInProgress)
        ));

        gate.notify_one();
        first.await.unwrap().unwrap();

        assert_eq!(provider.acquire_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.store_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.handshake_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.state(), LifecycleState::Connected);
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_invalid() {
        let backend = Arc::new(MockBackend::default());
        let store = connected_store();
        let ctl = controller(Arc::new(MockProvider::default()), backend.clone(), store.clone()).await;

        assert_eq!(ctl.state(), LifecycleState::Connected);
        let err = ctl.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidState(_)));
        assert_eq!(backend.network_calls(), 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_connect_commits_nothing() {
        let store = Arc::new(MemorySessionStore::new());
        let backend = Arc::new(MockBackend {
            handshake_failures: u32::MAX,
            ..Default::default()
        });
        let ctl = ConnectionController::restore(
            Arc::new(MockProvider::default()),
            backend.clone(),
            store.clone(),
            RetryPolicy::new(3, Duration::from_secs(60)),
        )
        .await
        .unwrap();

        let err = ctl
            .connect_until(tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectionError::Abandoned));
        assert_eq!(backend.handshake_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.state(), LifecycleState::Disconnected);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_connect_future_resets_state() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(MockProvider {
            gate: Some(gate),
            ..Default::default()
        });
        let ctl = controller(
            provider.clone(),
            Arc::new(MockBackend::default()),
            Arc::new(MemorySessionStore::new()),
        )
        .await;

        {
            let pending = ctl.connect();
            tokio::pin!(pending);
            // Poll once so the protocol enters Acquiring, then drop it.
            let _ = tokio::time::timeout(Duration::from_millis(10), &mut pending).await;
            assert_eq!(ctl.state(), LifecycleState::Acquiring);
        }

        assert_eq!(ctl.state(), LifecycleState::Disconnected);
    }

    /// Parks every save until the gate opens.
    #[derive(Default)]
    struct GatedStore {
        inner: MemorySessionStore,
        gate: Notify,
        saving: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for GatedStore {
        async fn load(&self) -> Result<SessionState, StoreError> {
            self.inner.load().await
        }

        async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
            self.saving.store(true, Ordering::SeqCst);
            self.gate.notified().await;
            self.inner.save(state).await
        }
    }

    #[tokio::test]
    async fn test_dropped_connect_during_commit_still_connects() {
        let store = Arc::new(GatedStore::default());
        let ctl = ConnectionController::restore(
            Arc::new(MockProvider::default()),
            Arc::new(MockBackend::default()),
            store.clone(),
            fast_retry(),
        )
        .await
        .unwrap();
        let mut rx = ctl.subscribe();

        {
            let pending = ctl.connect();
            tokio::pin!(pending);
            while !store.saving.load(Ordering::SeqCst) {
                let _ = tokio::time::timeout(Duration::from_millis(5), &mut pending).await;
            }
        }

        // The write is still in flight, so the controller stays busy.
        assert_eq!(ctl.state(), LifecycleState::Handshaking);
        assert!(matches!(
            ctl.connect().await,
            Err(ConnectionError::OperationInProgress)
        ));

        store.gate.notify_one();
        rx.wait_for(|s| *s == LifecycleState::Connected).await.unwrap();

        assert_eq!(ctl.state(), LifecycleState::Connected);
        assert!(store.inner.snapshot().is_valid_connection());
    }

    #[tokio::test]
    async fn test_restore_starts_connected() {
        let ctl = controller(
            Arc::new(MockProvider::default()),
            Arc::new(MockBackend::default()),
            connected_store(),
        )
        .await;
        assert_eq!(ctl.state(), LifecycleState::Connected);
    }

    #[tokio::test]
    async fn test_restore_ignores_incomplete_record() {
        let store = Arc::new(MemorySessionStore::with_state(SessionState {
            is_connected: true,
            user_email: None,
            gmail_token: Some(Credential::new(TOKEN)),
        }));
        let ctl = controller(
            Arc::new(MockProvider::default()),
            Arc::new(MockBackend::default()),
            store,
        )
        .await;
        assert_eq!(ctl.state(), LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_clears_then_revokes() {
        let store = connected_store();
        let provider = Arc::new(MockProvider::default());
        let backend = Arc::new(MockBackend::default());
        let ctl = controller(provider.clone(), backend.clone(), store.clone()).await;

        let account = ctl.disconnect().await.unwrap();

        assert_eq!(account, ACCOUNT);
        assert_eq!(ctl.state(), LifecycleState::Disconnected);
        assert!(store.snapshot().is_empty());
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_survives_revoke_failures() {
        let store = connected_store();
        let provider = Arc::new(MockProvider::default());
        provider.fail_revoke.store(true, Ordering::SeqCst);
        let backend = Arc::new(MockBackend {
            fail_logout: true,
            ..Default::default()
        });
        let ctl = controller(provider.clone(), backend.clone(), store.clone()).await;

        let account = ctl.disconnect().await.unwrap();

        assert_eq!(account, ACCOUNT);
        assert!(!store.snapshot().is_connected);
        assert!(store.snapshot().is_empty());
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.state(), LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_a_no_op() {
        let store = Arc::new(MemorySessionStore::new());
        let provider = Arc::new(MockProvider::default());
        let backend = Arc::new(MockBackend::default());
        let ctl = controller(provider.clone(), backend.clone(), store.clone()).await;

        let err = ctl.disconnect().await.unwrap_err();

        assert!(matches!(err, ConnectionError::InvalidState(_)));
        assert_eq!(backend.network_calls(), 0);
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.writes(), 0);
        assert_eq!(ctl.state(), LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_store_failure_keeps_connection() {
        let store = connected_store();
        store.set_fail_writes(true);
        let provider = Arc::new(MockProvider::default());
        let backend = Arc::new(MockBackend::default());
        let ctl = controller(provider.clone(), backend.clone(), store.clone()).await;

        let err = ctl.disconnect().await.unwrap_err();

        assert!(matches!(err, ConnectionError::Store(_)));
        assert_eq!(ctl.state(), LifecycleState::Connected);
        assert!(store.snapshot().is_connected);
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let store = connected_store();
        let backend = Arc::new(MockBackend::default());
        let ctl = controller(Arc::new(MockProvider::default()), backend.clone(), store.clone()).await;

        ctl.disconnect().await.unwrap();
        ctl.connect().await.unwrap();

        assert_eq!(ctl.state(), LifecycleState::Connected);
        assert!(store.snapshot().is_valid_connection());
    }
}
