//! KeyedStore Port (Trait Interface)
//!
//! Port/Adapter pattern for backend flexibility:
//! - Production: SQLite (durable, zero-config)
//! - Testing: InMemory (fast unit tests)

use async_trait::async_trait;

use super::keys::{CacheKey, RepositoryId};
use crate::Result;

/// Byte-ordered key-value store
///
/// Single-key operations are atomic; nothing else is transactional.
/// Absence is `Ok(None)`, never an error.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Point lookup
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite a key
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove a key (no-op when absent)
    async fn delete(&self, key: &[u8]) -> Result<()>;

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn delete_all_with_prefix(&self, prefix: &[u8]) -> Result<usize>;

    /// Values of every key starting with `prefix`, in key order
    async fn find_all_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Whether a key exists
    async fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// True iff all eight category keys exist for `id`
///
/// Membership is checked key by key against the enumerated set rather than
/// by counting prefix matches.
pub async fn is_fully_cached(store: &dyn KeyedStore, id: &RepositoryId) -> Result<bool> {
    for key in id.cache_keys() {
        if !store.contains(key.as_bytes()).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Keys among the eight that are currently absent
pub async fn missing_keys(store: &dyn KeyedStore, id: &RepositoryId) -> Result<Vec<CacheKey>> {
    let mut missing = Vec::new();
    for key in id.cache_keys() {
        if !store.contains(key.as_bytes()).await? {
            missing.push(key);
        }
    }
    Ok(missing)
}

/// Remove all cached data for `id`
pub async fn clear_repository(store: &dyn KeyedStore, id: &RepositoryId) -> Result<usize> {
    store.delete_all_with_prefix(&id.key_prefix()).await
}

/// Smallest byte string greater than every string starting with `prefix`
///
/// `None` when no such bound exists (empty prefix or all `0xFF`).
pub fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.pop() {
        if last < u8::MAX {
            bound.push(last + 1);
            return Some(bound);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound(b"abc"), Some(b"abd".to_vec()));
        assert_eq!(prefix_upper_bound(&[0x61, 0xFF]), Some(vec![0x62]));
        assert_eq!(prefix_upper_bound(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_upper_bound(b""), None);
    }
}
