use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

use super::object_store::ObjectStore;
use super::types::{validate_key, StoreError};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Local filesystem object store.
///
/// Each bucket is a directory under `root`; each key is a relative path
/// inside it. Writes go to a hidden temporary sibling and are renamed into
/// place, so readers never observe a partially written object.
#[derive(Debug, Clone)]
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

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        validate_key(bucket)?;
        if bucket.contains('/') {
            return Err(StoreError::InvalidKey(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        let mut path = self.bucket_dir(bucket)?;
        path.extend(key.split('/'));
        Ok(path)
    }
}

/// Hidden, unpredictable sibling path used for in-flight writes.
fn temp_path_for(path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp.{nanos:016x}.{seq}"))
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = temp_path_for(path);
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await?;

    let written = async {
        file.write_all(body).await?;
        file.sync_all().await
    }
    .await;
    drop(file);

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    // Rename replaces the destination atomically on POSIX; Windows needs it gone first
    #[cfg(windows)]
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    Ok(())
}

impl ObjectStore for FileStore {
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(bucket, key)?;
        write_atomic(&path, body).await?;
        tracing::debug!(bucket = bucket, key = key, bytes = body.len(), "put_object");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.resolve(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!(bucket = bucket, key = key, bytes = bytes.len(), "get_object");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let root = self.bucket_dir(bucket)?;
        let mut keys = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(root, String::new())];

        while let Some((dir, dir_key)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                // Hidden names are in-flight temp files
                if name.starts_with('.') {
                    continue;
                }
                let key = if dir_key.is_empty() {
                    name
                } else {
                    format!("{dir_key}/{name}")
                };

                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        tracing::debug!(bucket = bucket, prefix = prefix, count = keys.len(), "list_objects");
        Ok(keys)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let path = self.resolve(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(bucket = bucket, key = key, "delete_object");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(name: &str) -> FileStore {
        let dir = std::env::temp_dir().join(format!("podscrape_file_store_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        FileStore::new(dir)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = test_store("round_trip");
        store.put("config", "a.json", b"{}").await.unwrap();
        assert_eq!(store.get("config", "a.json").await.unwrap(), Some(b"{}".to_vec()));
        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_missing_object_is_none() {
        let store = test_store("missing");
        assert!(store.get("config", "nope.json").await.unwrap().is_none());
        assert!(!store.delete("config", "nope.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_and_leaves_no_temp_files() {
        let store = test_store("overwrite");
        store.put("config", "index.json", b"old").await.unwrap();
        store.put("config", "index.json", b"new").await.unwrap();

        assert_eq!(store.get("config", "index.json").await.unwrap(), Some(b"new".to_vec()));

        let names: Vec<String> = std::fs::read_dir(store.root().join("config"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["index.json".to_string()]);

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_list_nested_sorted_with_prefix() {
        let store = test_store("list");
        store.put("audio", "show-b/2.mp3", b"x").await.unwrap();
        store.put("audio", "show-a/1.mp3", b"x").await.unwrap();
        store.put("audio", "show-a/0.mp3", b"x").await.unwrap();

        let all = store.list("audio", "").await.unwrap();
        assert_eq!(all, vec!["show-a/0.mp3", "show-a/1.mp3", "show-b/2.mp3"]);

        let filtered = store.list("audio", "show-a/").await.unwrap();
        assert_eq!(filtered, vec!["show-a/0.mp3", "show-a/1.mp3"]);

        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_list_missing_bucket_is_empty() {
        let store = test_store("list_missing");
        assert!(store.list("nothing", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_existing() {
        let store = test_store("delete");
        store.put("config", "k", b"v").await.unwrap();
        assert!(store.delete("config", "k").await.unwrap());
        assert!(store.get("config", "k").await.unwrap().is_none());
        std::fs::remove_dir_all(store.root()).ok();
    }

    #[tokio::test]
    async fn test_traversal_key_rejected() {
        let store = test_store("traversal");
        let result = store.put("config", "../escape", b"x").await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));

        let result = store.get("con/fig", "k").await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }
}
