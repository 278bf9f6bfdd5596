//! In-process store, for embedding and tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::SessionStore;
use crate::error::StoreError;
use crate::types::SessionState;

#[derive(Default)]
pub struct MemorySessionStore {
    state: Mutex<SessionState>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Default::default()
        }
    }

    /// Current record without going through the async trait.
    pub fn snapshot(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Number of successful `save`/`clear` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail, to exercise commit failures.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<SessionState, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }

        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("session lock poisoned".to_string()))?;
        *guard = state.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
