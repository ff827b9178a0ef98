use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::{CommitOutcome, ParticipantStore, StoredRecord};
use crate::error::StoreError;
use crate::record::{Identity, ParticipantRecord};

/// Wrapper that injects outages and stalls in front of another store.
/// Used by drills to exercise retryable failure paths.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    fail_next: AtomicU32,
    stall: Mutex<Option<Duration>>,
}

impl<S> FlakyStore<S> {
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            fail_next: AtomicU32::new(0),
            stall: Mutex::new(None),
        }
    }

    /// Make the next `calls` store calls fail as unavailable.
    pub fn fail_next(&self, calls: u32) {
        self.fail_next.store(calls, Ordering::SeqCst);
    }

    /// Delay every call by `delay` until cleared with `None`.
    pub fn stall(&self, delay: Option<Duration>) {
        *self.stall.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = delay;
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let delay = *self.stall.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let tripped = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ParticipantStore> ParticipantStore for FlakyStore<S> {
    fn total_levels(&self) -> u32 {
        self.inner.total_levels()
    }

    async fn load(&self, identity: &Identity) -> Result<Option<StoredRecord>, StoreError> {
        self.gate().await?;
        self.inner.load(identity).await
    }

    async fn create(
        &self,
        identity: &Identity,
        record: &ParticipantRecord,
    ) -> Result<bool, StoreError> {
        self.gate().await?;
        self.inner.create(identity, record).await
    }

    async fn commit(
        &self,
        identity: &Identity,
        expected_revision: u64,
        record: &ParticipantRecord,
    ) -> Result<CommitOutcome, StoreError> {
        self.gate().await?;
        self.inner.commit(identity, expected_revision, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HuntConfig;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn injected_failures_run_out() {
        let store = FlakyStore::new(MemoryStore::new(&HuntConfig::with_levels(6)));
        let who = Identity::parse("f@example.com").unwrap();
        store.fail_next(2);
        assert!(store.load(&who).await.is_err());
        assert!(store.load(&who).await.is_err());
        assert!(store.load(&who).await.unwrap().is_none());
    }
}
