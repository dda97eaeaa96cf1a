//! In-memory [`BlobStore`] implementation for tests and dry runs.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::storage::BlobStore;

/// In-memory blob store keyed by object name.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates an object, marking its key as already uploaded.
    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.write().unwrap().insert(key.into(), bytes);
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().unwrap().is_empty()
    }

    /// Returns a snapshot of all stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the stored bytes for `key`, if present.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().unwrap().contains_key(key))
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.objects.write().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn list_dirs(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let objects = self.objects.read().unwrap();
        let mut dirs: Vec<String> = objects
            .keys()
            .filter_map(|key| key.strip_prefix(prefix))
            .filter_map(|rest| rest.split_once('/').map(|(dir, _)| dir.to_string()))
            .collect();
        dirs.sort();
        dirs.dedup();
        Ok(dirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exists_after_upload() {
        let store = MemoryBlobStore::new();
        assert!(!store.exists("a/b.json").await.unwrap());

        store.upload("a/b.json", b"{}".to_vec()).await.unwrap();
        assert!(store.exists("a/b.json").await.unwrap());
        assert_eq!(store.get("a/b.json"), Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn test_list_dirs_returns_unique_sorted_names() {
        let store = MemoryBlobStore::new();
        store.insert("raw_data/20250801-0300/fhir/a.json", vec![]);
        store.insert("raw_data/20250801-0300/metadata/b.json", vec![]);
        store.insert("raw_data/20250725-0300/fhir/c.json", vec![]);
        store.insert("logs/run.log", vec![]);

        let dirs = store.list_dirs("raw_data/").await.unwrap();
        assert_eq!(dirs, vec!["20250725-0300", "20250801-0300"]);
    }
}
