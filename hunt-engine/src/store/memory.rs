use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{CommitOutcome, ParticipantStore, StoredRecord};
use crate::config::HuntConfig;
use crate::error::StoreError;
use crate::record::{Identity, ParticipantRecord};

#[derive(Debug, Clone)]
struct Slot {
    revision: u64,
    document: serde_json::Value,
}

/// In-process store keeping wire documents in a map.
#[derive(Debug)]
pub struct MemoryStore {
    total_levels: u32,
    slots: Mutex<HashMap<Identity, Slot>>,
}

impl MemoryStore {
    /// Empty store decoding records with `config.total_levels` levels.
    #[must_use]
    pub fn new(config: &HuntConfig) -> Self {
        Self {
            total_levels: config.total_levels,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Raw stored document for `identity`, as another client would see it.
    pub async fn document(&self, identity: &Identity) -> Option<serde_json::Value> {
        self.slots
            .lock()
            .await
            .get(identity)
            .map(|slot| slot.document.clone())
    }

    /// Seed or overwrite a raw document, bumping its revision.
    pub async fn put_document(&self, identity: &Identity, document: serde_json::Value) {
        let mut slots = self.slots.lock().await;
        let revision = slots.get(identity).map_or(1, |slot| slot.revision + 1);
        slots.insert(identity.clone(), Slot { revision, document });
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}

#[async_trait]
impl ParticipantStore for MemoryStore {
    fn total_levels(&self) -> u32 {
        self.total_levels
    }

    async fn load(&self, identity: &Identity) -> Result<Option<StoredRecord>, StoreError> {
        let Some(slot) = self.slots.lock().await.get(identity).cloned() else {
            return Ok(None);
        };
        let record = ParticipantRecord::from_document(slot.document, self.total_levels)?;
        Ok(Some(StoredRecord {
            revision: slot.revision,
            record,
        }))
    }

    async fn create(
        &self,
        identity: &Identity,
        record: &ParticipantRecord,
    ) -> Result<bool, StoreError> {
        let mut slots = self.slots.lock().await;
        if slots.contains_key(identity) {
            return Ok(false);
        }
        slots.insert(
            identity.clone(),
            Slot {
                revision: 1,
                document: record.to_document(),
            },
        );
        Ok(true)
    }

    async fn commit(
        &self,
        identity: &Identity,
        expected_revision: u64,
        record: &ParticipantRecord,
    ) -> Result<CommitOutcome, StoreError> {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(identity) {
            Some(slot) if slot.revision == expected_revision => {
                slot.revision += 1;
                slot.document = record.to_document();
                Ok(CommitOutcome::Committed {
                    revision: slot.revision,
                })
            }
            _ => Ok(CommitOutcome::Conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(raw: &str) -> Identity {
        Identity::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn create_is_insert_if_absent() {
        let store = MemoryStore::new(&HuntConfig::with_levels(6));
        let who = ident("a@example.com");
        assert!(store.create(&who, &ParticipantRecord::new("A", 6)).await.unwrap());
        assert!(!store.create(&who, &ParticipantRecord::new("B", 6)).await.unwrap());
        let loaded = store.load(&who).await.unwrap().unwrap();
        assert_eq!(loaded.record.name, "A");
        assert_eq!(loaded.revision, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn commit_requires_current_revision() {
        let store = MemoryStore::new(&HuntConfig::with_levels(2));
        let who = ident("b@example.com");
        store.create(&who, &ParticipantRecord::new("B", 2)).await.unwrap();

        let mut next = ParticipantRecord::new("B", 2);
        next.set_flag(1);
        assert_eq!(
            store.commit(&who, 1, &next).await.unwrap(),
            CommitOutcome::Committed { revision: 2 }
        );
        assert_eq!(
            store.commit(&who, 1, &next).await.unwrap(),
            CommitOutcome::Conflict
        );
        let missing = ident("nobody@example.com");
        assert_eq!(
            store.commit(&missing, 1, &next).await.unwrap(),
            CommitOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn documents_follow_wire_schema() {
        let store = MemoryStore::new(&HuntConfig::with_levels(3));
        let who = ident("c@example.com");
        store.create(&who, &ParticipantRecord::new("C", 3)).await.unwrap();
        let doc = store.document(&who).await.unwrap();
        assert_eq!(doc["qr3"], false);
        assert!(doc["startTime"].is_null());
        assert!(store.load(&ident("none@example.com")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_document_surfaces_as_error() {
        let store = MemoryStore::new(&HuntConfig::with_levels(3));
        let who = ident("d@example.com");
        store
            .put_document(&who, serde_json::json!({"startTime": 12}))
            .await;
        assert!(matches!(
            store.load(&who).await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
