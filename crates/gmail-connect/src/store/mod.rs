//! Persisted session store.
//!
//! The store holds exactly one [`SessionState`] record. Writes replace the
//! whole record, so `isConnected`, `userEmail` and `gmailToken` always change
//! together.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::SessionState;

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the current record. A store that was never written reads as
    /// the empty state.
    async fn load(&self) -> Result<SessionState, StoreError>;

    /// Replace the record.
    async fn save(&self, state: &SessionState) -> Result<(), StoreError>;

    /// Remove the connection keys.
    async fn clear(&self) -> Result<(), StoreError> {
        self.save(&SessionState::default()).await
    }
}
