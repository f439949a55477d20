//! One JSON file per key.
//!
//! ```text
//! <dir>/<key>.json
//! ```

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hostctl_core::{KeyValueStore, StoreError};
use tokio::fs;

const EXTENSION: &str = "json";

/// `KeyValueStore` over a directory.
///
/// Writes go to `<key>.json.tmp` first and are renamed into place, so a
/// reader never observes a half-written record.
#[derive(Debug, Clone)]
pub struct FsKeyValueStore {
    dir: PathBuf,
}

impl FsKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Io(format!("invalid key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }
}

fn io_err(err: &io::Error) -> StoreError {
    StoreError::Io(err.to_string())
}

#[async_trait]
impl KeyValueStore for FsKeyValueStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let final_path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).await.map_err(|e| io_err(&e))?;

        let temp_path = self.dir.join(format!("{key}.{EXTENSION}.tmp"));
        fs::write(&temp_path, value).await.map_err(|e| io_err(&e))?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| io_err(&e))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        // No record can exist under a key `put` would refuse
        let Ok(path) = self.path_for(key) else {
            return Ok(None);
        };
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&e))? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_get_overwrite() {
        let dir = tempdir().unwrap();
        let store = FsKeyValueStore::new(dir.path().join("jobs"));

        assert_eq!(store.get("job-1").await.unwrap(), None);
        store.put("job-1", b"one".to_vec()).await.unwrap();
        store.put("job-1", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("job-1").await.unwrap(), Some(b"two".to_vec()));
        assert!(!dir.path().join("jobs/job-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn keys_ignore_other_files() {
        let dir = tempdir().unwrap();
        let store = FsKeyValueStore::new(dir.path());
        store.put("b", b"{}".to_vec()).await.unwrap();
        store.put("a", b"{}".to_vec()).await.unwrap();
        std::fs::write(dir.path().join("a.log"), "artifact").unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FsKeyValueStore::new(dir.path());
        store.put("k", b"v".to_vec()).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_directory_has_no_keys() {
        let dir = tempdir().unwrap();
        let store = FsKeyValueStore::new(dir.path().join("absent"));
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let store = FsKeyValueStore::new(dir.path());
        assert!(store.put("../escape", vec![]).await.is_err());
        assert!(store.delete("a/b").await.is_err());
        assert_eq!(store.get("../escape").await.unwrap(), None);
    }
}
