//! Keyed collection storage.
//!
//! A store maps a string key to one JSON document holding a whole collection.
//! Callers read the full collection, mutate it in memory and write it back;
//! there is no partial update and the last write wins.

mod file;
mod memory;

use std::path::PathBuf;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io failure on key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed document under key {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode collection {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
    #[error("storage unavailable")]
    Unavailable,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable keyed storage of JSON collections.
///
/// Implementors only move raw documents; encoding lives in the provided
/// methods so every backend agrees on the wire shape.
#[allow(async_fn_in_trait)]
pub trait CollectionStore {
    /// Raw document for `key`, or `None` when nothing was ever written.
    async fn read_document(&self, key: &str) -> StoreResult<Option<String>>;

    async fn write_document(&self, key: &str, body: String) -> StoreResult<()>;

    /// Missing keys load as an empty collection.
    async fn load_collection<T>(&self, key: &str) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        match self.read_document(key).await? {
            Some(body) if !body.trim().is_empty() => {
                serde_json::from_str(&body).map_err(|source| StoreError::Malformed {
                    key: key.to_string(),
                    source,
                })
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn save_collection<T>(&self, key: &str, items: &[T]) -> StoreResult<()>
    where
        T: Serialize,
    {
        let body = serde_json::to_string(items).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.write_document(key, body).await
    }
}

/// Environment-driven settings for the file backend.
#[derive(Clone, Debug)]
pub struct StoreSettings {
    env_key: String,
}

const DEFAULT_DATA_DIR: &str = ".pipeline-data";

impl Default for StoreSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl StoreSettings {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new("PIPELINE_DATA_DIR")
    }

    pub fn data_dir(&self) -> PathBuf {
        std::env::var(&self.env_key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_env_key_falls_back_to_default_dir() {
        let settings = StoreSettings::new("PLATFORM_STORE_TEST_UNSET_KEY");
        assert_eq!(settings.data_dir(), PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[tokio::test]
    async fn missing_key_loads_empty_collection() {
        let store = MemoryStore::new();
        let items: Vec<String> = store.load_collection("nothing-here").await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn garbage_document_is_reported_as_malformed() {
        let store = MemoryStore::new();
        store
            .write_document("broken", "{not json".to_string())
            .await
            .unwrap();
        let err = store
            .load_collection::<String>("broken")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Malformed { ref key, .. } if key == "broken"));
    }
}
