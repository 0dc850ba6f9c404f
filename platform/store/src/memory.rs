use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{CollectionStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, String>,
    writes: HashMap<String, usize>,
}

/// Process-local store. Clones share the same documents.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every read and write fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful writes recorded for `key`.
    pub fn write_count(&self, key: &str) -> usize {
        self.lock()
            .map(|inner| inner.writes.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        self.inner.lock().map_err(|_| StoreError::Unavailable)
    }
}

impl CollectionStore for MemoryStore {
    async fn read_document(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.documents.get(key).cloned())
    }

    async fn write_document(&self, key: &str, body: String) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.documents.insert(key.to_string(), body);
        *inner.writes.entry(key.to_string()).or_default() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_documents() {
        let store = MemoryStore::new();
        let other = store.clone();
        store
            .save_collection("numbers", &[1_u32, 2, 3])
            .await
            .unwrap();
        let loaded: Vec<u32> = other.load_collection("numbers").await.unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);
        assert_eq!(other.write_count("numbers"), 1);
    }

    #[tokio::test]
    async fn unavailable_store_rejects_reads_and_writes() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.read_document("k").await,
            Err(StoreError::Unavailable)
        ));
        assert!(matches!(
            store.save_collection("k", &["x"]).await,
            Err(StoreError::Unavailable)
        ));
        store.set_unavailable(false);
        assert!(store.read_document("k").await.unwrap().is_none());
    }
}
