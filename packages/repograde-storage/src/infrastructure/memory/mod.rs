//! In-memory KeyedStore
//!
//! Ordered map behind a read/write lock. Used by tests and as a throwaway
//! cache when no database path is configured.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::KeyedStore;
use crate::Result;

#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn delete_all_with_prefix(&self, prefix: &[u8]) -> Result<usize> {
        let mut entries = self.entries.write();
        let doomed: Vec<Vec<u8>> = entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        Ok(doomed.len())
    }

    async fn find_all_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, value)| value.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_put_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get(b"k").await.unwrap(), None);

        store.put(b"k", b"v1").await.unwrap();
        store.put(b"k", b"v2").await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"v2".to_vec()));

        store.delete(b"k").await.unwrap();
        assert!(!store.contains(b"k").await.unwrap());
        // Deleting again is a no-op
        store.delete(b"k").await.unwrap();
    }

    #[tokio::test]
    async fn test_prefix_operations() {
        let store = MemoryStore::new();
        store.put(b"repo-a-1", b"1").await.unwrap();
        store.put(b"repo-a-2", b"2").await.unwrap();
        store.put(b"repo-b-1", b"3").await.unwrap();
        store.put(b"repo", b"4").await.unwrap();

        let found = store.find_all_with_prefix(b"repo-a-").await.unwrap();
        assert_eq!(found, vec![b"1".to_vec(), b"2".to_vec()]);

        let removed = store.delete_all_with_prefix(b"repo-a-").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 2);
        assert!(store.contains(b"repo-b-1").await.unwrap());
    }
}
