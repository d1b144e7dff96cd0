//! repograde-storage: keyed cache for repository analysis data
//!
//! ## Core Principles
//!
//! 1. **One key per category**: each `(name, branch, category)` triple maps to
//!    exactly one key, so concurrent writers never tear a value.
//! 2. **Absence is data**: `get` returns `Ok(None)` for a missing key; errors
//!    are reserved for backend failures.
//! 3. **Explicit completeness**: "fully cached" is membership of all eight
//!    enumerated keys, never a count of prefix matches.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use repograde_storage::{codec, CacheKey, Category, KeyedStore, MemoryStore, RepositoryId};
//!
//! let store = MemoryStore::new();
//! let id = RepositoryId::default_branch("github.com/org/project");
//! let key = CacheKey::new(&id, Category::Imports);
//!
//! store.put(key.as_bytes(), &codec::encode(&vec!["github.com/pkg/errors"])?).await?;
//! let imports: Vec<String> = codec::decode(&store.get(key.as_bytes()).await?.unwrap())?;
//! ```

pub mod codec;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    clear_repository, is_fully_cached, missing_keys, CacheKey, Category, KeyedStore, RepositoryId,
};
pub use infrastructure::MemoryStore;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteStore;
