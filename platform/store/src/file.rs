use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{CollectionStore, StoreError, StoreResult};

/// One JSON file per key under a data directory.
///
/// Writes go to a sibling temp file that is renamed into place, so a reader
/// sees either the previous document or the new one.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn io_error(key: &str, source: std::io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        source,
    }
}

impl CollectionStore for FileStore {
    async fn read_document(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(key, err)),
        }
    }

    async fn write_document(&self, key: &str, body: String) -> StoreResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| io_error(key, err))?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body.as_bytes())
            .await
            .map_err(|err| io_error(key, err))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|err| io_error(key, err))?;
        debug!(key, bytes = body.len(), "collection written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_survive_a_fresh_handle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"));
        store
            .save_collection("ceo-app-negotiations", &["a", "b"])
            .await
            .unwrap();

        let reopened = FileStore::new(dir.path().join("data"));
        let items: Vec<String> = reopened
            .load_collection("ceo-app-negotiations")
            .await
            .unwrap();
        assert_eq!(items, vec!["a".to_string(), "b".to_string()]);
        assert!(!dir.path().join("data/ceo-app-negotiations.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_directory_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("never-created"));
        assert!(store.read_document("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn path_traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for key in ["../escape", "", ".hidden", "a/b"] {
            assert!(matches!(
                store.read_document(key).await,
                Err(StoreError::InvalidKey(_))
            ));
        }
    }
}
