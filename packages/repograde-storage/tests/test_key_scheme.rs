//! Key scheme and completeness predicate against both store adapters

use proptest::prelude::*;
use repograde_storage::{
    clear_repository, is_fully_cached, missing_keys, CacheKey, Category, KeyedStore, MemoryStore,
    RepositoryId, SqliteStore,
};

async fn write_all_keys(store: &dyn KeyedStore, id: &RepositoryId) {
    for key in id.cache_keys() {
        store.put(key.as_bytes(), b"{}").await.unwrap();
    }
}

async fn completeness_flips_on_any_delete(store: &dyn KeyedStore) {
    let id = RepositoryId::default_branch("github.com/org/project");

    for removed in Category::ALL {
        write_all_keys(store, &id).await;
        assert!(is_fully_cached(store, &id).await.unwrap());

        let key = CacheKey::new(&id, removed);
        store.delete(key.as_bytes()).await.unwrap();

        assert!(!is_fully_cached(store, &id).await.unwrap());
        assert_eq!(missing_keys(store, &id).await.unwrap(), vec![key]);
    }
}

#[tokio::test]
async fn test_completeness_memory() {
    completeness_flips_on_any_delete(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_completeness_sqlite() {
    completeness_flips_on_any_delete(&SqliteStore::new_in_memory().unwrap()).await;
}

#[tokio::test]
async fn test_clear_only_touches_own_identifier() {
    let store = MemoryStore::new();
    let target = RepositoryId::new("github.com/o/p", "x");
    let neighbour = RepositoryId::default_branch("github.com/o/p-x");
    let other_branch = RepositoryId::new("github.com/o/p", "");

    write_all_keys(&store, &target).await;
    write_all_keys(&store, &neighbour).await;
    write_all_keys(&store, &other_branch).await;

    let removed = clear_repository(&store, &target).await.unwrap();
    assert_eq!(removed, 8);
    assert!(!is_fully_cached(&store, &target).await.unwrap());
    assert!(is_fully_cached(&store, &neighbour).await.unwrap());
    assert!(is_fully_cached(&store, &other_branch).await.unwrap());
}

#[tokio::test]
async fn test_sqlite_is_durable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let id = RepositoryId::new("github.com/org/project", "main");

    {
        let store = SqliteStore::open(&path).unwrap();
        write_all_keys(&store, &id).await;
    }

    let reopened = SqliteStore::open(&path).unwrap();
    assert!(is_fully_cached(&reopened, &id).await.unwrap());
    assert_eq!(
        reopened
            .find_all_with_prefix(&id.key_prefix())
            .await
            .unwrap()
            .len(),
        8
    );
}

fn component() -> impl Strategy<Value = String> {
    "[a-z%./-]{0,12}"
}

fn category() -> impl Strategy<Value = Category> {
    prop::sample::select(Category::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_cache_key_is_pure(name in component(), branch in component(), cat in category()) {
        let id = RepositoryId::new(name.clone(), branch.clone());
        prop_assert_eq!(CacheKey::new(&id, cat), CacheKey::new(&RepositoryId::new(name, branch), cat));
    }

    #[test]
    fn prop_cache_key_is_injective(
        a in (component(), component(), category()),
        b in (component(), component(), category()),
    ) {
        let ka = CacheKey::new(&RepositoryId::new(a.0.clone(), a.1.clone()), a.2);
        let kb = CacheKey::new(&RepositoryId::new(b.0.clone(), b.1.clone()), b.2);
        prop_assert_eq!(ka == kb, a == b);
    }
}
