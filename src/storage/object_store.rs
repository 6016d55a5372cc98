use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

use super::file_store::FileStore;
use super::sqlite_store::SqliteStore;
use super::types::StoreError;
use crate::config::{Config, StorageBackend};

/// Bucket/key object storage consumed by the scraper.
///
/// Values are opaque bytes; structured records go through [`get_json`] and
/// [`put_json`]. Implementations must make a single `put` atomic from the
/// point of view of later `get` calls: a reader sees either the previous
/// value or the new one, never a torn write.
pub trait ObjectStore: Send + Sync {
    /// Write (create or replace) an object.
    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read an object. Missing objects yield `Ok(None)`.
    fn get(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// List keys in a bucket starting with `prefix`, sorted ascending.
    fn list(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Delete an object. Returns `false` if it did not exist.
    fn delete(&self, bucket: &str, key: &str)
        -> impl Future<Output = Result<bool, StoreError>> + Send;
}

impl<T: ObjectStore> ObjectStore for &T {
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StoreError> {
        (**self).put(bucket, key, body).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list(bucket, prefix).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        (**self).delete(bucket, key).await
    }
}

/// Read an object and decode it as JSON.
///
/// A missing object is `Ok(None)`. Malformed JSON is an error rather than
/// `None`: callers doing read-modify-write must not mistake a corrupt record
/// for an empty one and overwrite it.
pub async fn get_json<S, T>(store: &S, bucket: &str, key: &str) -> Result<Option<T>, StoreError>
where
    S: ObjectStore,
    T: DeserializeOwned,
{
    let Some(bytes) = store.get(bucket, key).await? else {
        tracing::debug!(bucket = bucket, key = key, "Object not found");
        return Ok(None);
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Json {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })
}

/// Encode a value as pretty-printed JSON and write it.
pub async fn put_json<S, T>(store: &S, bucket: &str, key: &str, value: &T) -> Result<(), StoreError>
where
    S: ObjectStore,
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        bucket: bucket.to_string(),
        key: key.to_string(),
        source,
    })?;
    store.put(bucket, key, &body).await
}

/// Backend chosen from configuration.
///
/// `ObjectStore` uses `impl Future` returns and is not object safe, so the
/// closed set of backends is dispatched through this enum instead of a
/// trait object.
#[derive(Clone)]
pub enum Store {
    Files(FileStore),
    Sqlite(SqliteStore),
}

impl Store {
    /// Open the backend named by `config.storage_backend` under `data_dir`.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        match config.storage_backend {
            StorageBackend::Files => Ok(Store::Files(FileStore::new(&config.data_dir))),
            StorageBackend::Sqlite => {
                let path = config.database_path();
                let path = path.to_str().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("non UTF-8 database path: {}", path.display()),
                    )
                })?;
                Ok(Store::Sqlite(SqliteStore::open(path).await?))
            }
        }
    }
}

impl ObjectStore for Store {
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StoreError> {
        match self {
            Store::Files(s) => s.put(bucket, key, body).await,
            Store::Sqlite(s) => s.put(bucket, key, body).await,
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Store::Files(s) => s.get(bucket, key).await,
            Store::Sqlite(s) => s.get(bucket, key).await,
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        match self {
            Store::Files(s) => s.list(bucket, prefix).await,
            Store::Sqlite(s) => s.list(bucket, prefix).await,
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        match self {
            Store::Files(s) => s.delete(bucket, key).await,
            Store::Sqlite(s) => s.delete(bucket, key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u32,
    }

    async fn test_store() -> SqliteStore {
        SqliteStore::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let store = test_store().await;
        let record = Record {
            name: "show".into(),
            count: 3,
        };

        put_json(&store, "config", "record.json", &record).await.unwrap();
        let loaded: Option<Record> = get_json(&store, "config", "record.json").await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_json_missing_is_none() {
        let store = test_store().await;
        let loaded: Option<Record> = get_json(&store, "config", "missing.json").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_json_malformed_is_error() {
        let store = test_store().await;
        store.put("config", "bad.json", b"{not json").await.unwrap();

        let result: Result<Option<Record>, _> = get_json(&store, "config", "bad.json").await;
        match result {
            Err(StoreError::Json { bucket, key, .. }) => {
                assert_eq!(bucket, "config");
                assert_eq!(key, "bad.json");
            }
            other => panic!("Expected Json error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_enum_dispatches() {
        let store = Store::Sqlite(test_store().await);
        store.put("config", "k", b"v").await.unwrap();
        assert_eq!(store.get("config", "k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.list("config", "").await.unwrap(), vec!["k".to_string()]);
        assert!(store.delete("config", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let dir = std::env::temp_dir().join("podscrape_store_open");
        let _ = std::fs::remove_dir_all(&dir);

        for backend in [StorageBackend::Files, StorageBackend::Sqlite] {
            let config = Config {
                data_dir: dir.join(format!("{backend:?}")),
                storage_backend: backend,
                ..Config::default()
            };
            let store = Store::open(&config).await.unwrap();
            match (&store, backend) {
                (Store::Files(_), StorageBackend::Files) | (Store::Sqlite(_), StorageBackend::Sqlite) => {}
                _ => panic!("backend mismatch for {backend:?}"),
            }
            store.put("config", "k", b"v").await.unwrap();
            assert_eq!(store.get("config", "k").await.unwrap(), Some(b"v".to_vec()));
        }
        assert!(dir.join("Sqlite").join("podscrape.db").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
