use async_trait::async_trait;
use bytes::Bytes;

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

/// Errors from a store backend. These never cross the request path: the
/// trait implementations below log them and degrade (miss on read, dropped
/// write on put).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat string-keyed byte store backing the cache.
///
/// Contract: availability over consistency. `get` reports backend failures
/// as a miss and `put` swallows them, so a store outage degrades the proxy
/// to a pure passthrough without ever breaking request serving.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the entry stored under `key`, or `None` on miss or backend error.
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Persist `body` under `key`. Overwrites are idempotent: an entry is
    /// only ever rewritten with content assumed equal to what is there.
    async fn put(&self, key: &str, body: Bytes);
}
