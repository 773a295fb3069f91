use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::ObjectStore;

/// In-memory object store. Used by the test suite and by `store memory;`
/// deployments where durability across restarts does not matter.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    async fn put(&self, key: &str, body: Bytes) {
        self.entries.insert(key.to_string(), body);
    }
}
