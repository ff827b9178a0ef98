//! Durable participant storage.
//!
//! Every write is a whole-record compare-and-swap against the revision read
//! earlier, so a flag and its completion times always land together or not
//! at all, and two writers racing on one participant cannot both win.

mod file;
mod flaky;
mod memory;

pub use file::FileStore;
pub use flaky::FlakyStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::record::{Identity, ParticipantRecord};

/// A record together with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub revision: u64,
    pub record: ParticipantRecord,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { revision: u64 },
    /// The record changed (or vanished) since it was read; nothing was written.
    Conflict,
}

/// Trait for abstracting the durable participant store.
/// Platform-specific implementations should provide this.
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    /// Level count records are decoded with.
    fn total_levels(&self) -> u32;

    /// Load the record for `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached or the document is corrupt.
    async fn load(&self, identity: &Identity) -> Result<Option<StoredRecord>, StoreError>;

    /// Insert `record` unless one already exists. Returns `false` if it did.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn create(
        &self,
        identity: &Identity,
        record: &ParticipantRecord,
    ) -> Result<bool, StoreError>;

    /// Replace the record if it is still at `expected_revision`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    async fn commit(
        &self,
        identity: &Identity,
        expected_revision: u64,
        record: &ParticipantRecord,
    ) -> Result<CommitOutcome, StoreError>;
}

/// Run a store call, turning a stall past `limit` into [`StoreError::Timeout`].
///
/// # Errors
///
/// Returns the call's own error, or a timeout if it did not resolve in time.
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[async_trait]
impl<S: ParticipantStore + ?Sized> ParticipantStore for Arc<S> {
    fn total_levels(&self) -> u32 {
        (**self).total_levels()
    }

    async fn load(&self, identity: &Identity) -> Result<Option<StoredRecord>, StoreError> {
        (**self).load(identity).await
    }

    async fn create(
        &self,
        identity: &Identity,
        record: &ParticipantRecord,
    ) -> Result<bool, StoreError> {
        (**self).create(identity, record).await
    }

    async fn commit(
        &self,
        identity: &Identity,
        expected_revision: u64,
        record: &ParticipantRecord,
    ) -> Result<CommitOutcome, StoreError> {
        (**self).commit(identity, expected_revision, record).await
    }
}
