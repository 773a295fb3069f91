use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{ObjectStore, StoreError};

/// Sequence for process-unique temp file names, so two concurrent writers
/// for the same key never stomp on each other's in-progress file.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Durable object store backed by a flat directory: one file per key.
///
/// Keys contain path separators and the `|` digest delimiter, so the on-disk
/// name is the hex SHA-256 of the key. The mapping stays 1:1 and the
/// namespace stays flat regardless of key shape.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_name(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.root.join(Self::entry_name(key));
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, body: &[u8]) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let name = Self::entry_name(key);
        // Stage into a temp file and rename, so a crashed or concurrent write
        // never leaves a truncated entry visible under the real name.
        let tmp = self
            .root
            .join(format!("{}.{}.part", name, TMP_SEQ.fetch_add(1, Ordering::Relaxed)));
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, self.root.join(name)).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get(&self, key: &str) -> Option<Bytes> {
        match self.read(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Store read failed — treating as miss");
                None
            }
        }
    }

    async fn put(&self, key: &str, body: Bytes) {
        match self.write(key, &body).await {
            Ok(()) => debug!(key = %key, bytes = body.len(), "Cache entry persisted"),
            Err(e) => warn!(key = %key, error = %e, "Store write failed — entry dropped"),
        }
    }
}
