//! Domain layer: key scheme and the store port
//!
//! # Domain Models
//!
//! - `RepositoryId`: `(name, branch)` pair, immutable
//! - `Category`: one of the eight cacheable slices
//! - `CacheKey`: derived `name-branch-category` byte key
//!
//! # Port Trait
//!
//! - `KeyedStore`: ordered byte-key store with prefix operations

pub mod keys;
pub mod ports;

pub use keys::{CacheKey, Category, RepositoryId};
pub use ports::{clear_repository, is_fully_cached, missing_keys, prefix_upper_bound, KeyedStore};
