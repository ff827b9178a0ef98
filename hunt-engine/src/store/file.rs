use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{CommitOutcome, ParticipantStore, StoredRecord};
use crate::config::HuntConfig;
use crate::error::StoreError;
use crate::hints::HintCatalog;
use crate::record::{Identity, ParticipantRecord};

/// On-disk envelope: store revision plus the wire document.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    revision: u64,
    document: serde_json::Value,
}

/// JSON-file store laid out as `<root>/<users collection>/<identity>.json`.
///
/// Writes go to a temp file and are renamed into place. A store-wide lock
/// serialises read-check-write so commits stay compare-and-swap within one
/// process. The lock is held by the blocking task doing the write, so a
/// caller abandoning a commit (a deadline firing) cannot release it before
/// the rename lands.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    users_collection: String,
    hints_collection: String,
    total_levels: u32,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: &HuntConfig) -> Self {
        Self {
            root: root.into(),
            users_collection: config.collections.users.clone(),
            hints_collection: config.collections.hints.clone(),
            total_levels: config.total_levels,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn users_dir(&self) -> PathBuf {
        self.root.join(&self.users_collection)
    }

    fn record_path(&self, identity: &Identity) -> PathBuf {
        self.users_dir()
            .join(format!("{}.json", file_stem(identity.as_str())))
    }

    /// Load `<root>/<hints collection>.json` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load_hints(&self) -> Result<Option<HintCatalog>, StoreError> {
        let path = self.root.join(format!("{}.json", self.hints_collection));
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(HintCatalog::from_json(&json)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_envelope(&self, identity: &Identity) -> Result<Option<Envelope>, StoreError> {
        match tokio::fs::read(self.record_path(identity)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Run `op` on the blocking pool while holding the write lock.
    async fn locked<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op()
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("store write task failed: {err}")))?
    }
}

fn read_envelope_at(path: &Path) -> Result<Option<Envelope>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn write_envelope_at(path: &Path, envelope: &Envelope) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(envelope)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Map an identity to a safe file stem; anything outside `[A-Za-z0-9@._-]`
/// is percent-encoded, and a leading dot is encoded too.
fn file_stem(raw: &str) -> String {
    let mut stem = String::with_capacity(raw.len());
    for (idx, byte) in raw.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || matches!(byte, b'@' | b'_' | b'-')
            || (byte == b'.' && idx > 0);
        if keep {
            stem.push(char::from(byte));
        } else {
            let _ = write!(stem, "%{byte:02X}");
        }
    }
    stem
}

#[async_trait]
impl ParticipantStore for FileStore {
    fn total_levels(&self) -> u32 {
        self.total_levels
    }

    async fn load(&self, identity: &Identity) -> Result<Option<StoredRecord>, StoreError> {
        let Some(envelope) = self.read_envelope(identity).await? else {
            return Ok(None);
        };
        let record = ParticipantRecord::from_document(envelope.document, self.total_levels)?;
        Ok(Some(StoredRecord {
            revision: envelope.revision,
            record,
        }))
    }

    async fn create(
        &self,
        identity: &Identity,
        record: &ParticipantRecord,
    ) -> Result<bool, StoreError> {
        let path = self.record_path(identity);
        let document = record.to_document();
        self.locked(move || {
            if read_envelope_at(&path)?.is_some() {
                return Ok(false);
            }
            write_envelope_at(
                &path,
                &Envelope {
                    revision: 1,
                    document,
                },
            )?;
            Ok(true)
        })
        .await
    }

    async fn commit(
        &self,
        identity: &Identity,
        expected_revision: u64,
        record: &ParticipantRecord,
    ) -> Result<CommitOutcome, StoreError> {
        let path = self.record_path(identity);
        let document = record.to_document();
        self.locked(move || match read_envelope_at(&path)? {
            Some(current) if current.revision == expected_revision => {
                let next = Envelope {
                    revision: expected_revision + 1,
                    document,
                };
                write_envelope_at(&path, &next)?;
                Ok(CommitOutcome::Committed {
                    revision: next.revision,
                })
            }
            _ => Ok(CommitOutcome::Conflict),
        })
        .await
    }
}
