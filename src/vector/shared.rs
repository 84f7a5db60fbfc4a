//! Thread-safe handle over a [`VectorStore`]
//!
//! Writes go through one exclusive lock so an index append and its metadata
//! entry are always observed together; reads share the lock.

use super::metadata::Metadata;
use super::store::{SearchResult, StoreStats, VectorStore};
use crate::error::Result;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone)]
pub struct SharedVectorStore {
    inner: Arc<RwLock<VectorStore>>,
}

impl SharedVectorStore {
    pub fn new(store: VectorStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    // A panic mid-store cannot leave a half-applied write behind, since
    // `VectorStore::store` undoes its own partial work before returning.
    fn read(&self) -> RwLockReadGuard<'_, VectorStore> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VectorStore> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self, vector: &[f32], metadata: Option<Metadata>) -> Result<String> {
        self.write().store(vector, metadata)
    }

    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        self.read().search(query, top_k)
    }

    pub fn get(&self, id: &str) -> Option<Metadata> {
        self.read().get(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.read().dimension()
    }

    pub fn stats(&self) -> StoreStats {
        self.read().stats()
    }
}
