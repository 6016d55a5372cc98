use super::object_store::{get_json, put_json, ObjectStore};
use super::types::StoreError;
use crate::model::{Episode, PodcastRecord, PodcastSource};

/// Bucket holding the podcast catalog, episode indexes and podcast records.
pub const CONFIG_BUCKET: &str = "config";

/// Key of the master podcast list.
pub const PODCASTS_KEY: &str = "podcasts.json";

pub fn episode_index_key(podcast_id: &str) -> String {
    format!("episodes_{podcast_id}.json")
}

pub fn podcast_record_key(podcast_id: &str) -> String {
    format!("podcast_{podcast_id}.json")
}

/// Load the podcast catalog. A missing catalog is an empty list.
pub async fn load_podcasts<S: ObjectStore>(store: &S) -> Result<Vec<PodcastSource>, StoreError> {
    Ok(get_json(store, CONFIG_BUCKET, PODCASTS_KEY)
        .await?
        .unwrap_or_default())
}

/// Load a podcast's episode index. A missing index is empty; a corrupt one
/// is an error so it is never silently replaced.
pub async fn load_episode_index<S: ObjectStore>(
    store: &S,
    podcast_id: &str,
) -> Result<Vec<Episode>, StoreError> {
    Ok(
        get_json(store, CONFIG_BUCKET, &episode_index_key(podcast_id))
            .await?
            .unwrap_or_default(),
    )
}

/// Replace a podcast's episode index in full.
pub async fn save_episode_index<S: ObjectStore>(
    store: &S,
    podcast_id: &str,
    episodes: &[Episode],
) -> Result<(), StoreError> {
    put_json(store, CONFIG_BUCKET, &episode_index_key(podcast_id), episodes).await
}

pub async fn load_podcast_record<S: ObjectStore>(
    store: &S,
    podcast_id: &str,
) -> Result<Option<PodcastRecord>, StoreError> {
    get_json(store, CONFIG_BUCKET, &podcast_record_key(podcast_id)).await
}

pub async fn save_podcast_record<S: ObjectStore>(
    store: &S,
    record: &PodcastRecord,
) -> Result<(), StoreError> {
    put_json(
        store,
        CONFIG_BUCKET,
        &podcast_record_key(&record.source.id),
        record,
    )
    .await
}

/// Delete a podcast's index and record. Returns `true` if anything existed.
pub async fn remove_podcast_data<S: ObjectStore>(
    store: &S,
    podcast_id: &str,
) -> Result<bool, StoreError> {
    let index = store
        .delete(CONFIG_BUCKET, &episode_index_key(podcast_id))
        .await?;
    let record = store
        .delete(CONFIG_BUCKET, &podcast_record_key(podcast_id))
        .await?;
    Ok(index || record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    async fn test_store() -> SqliteStore {
        SqliteStore::open(":memory:").await.unwrap()
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(episode_index_key("daily"), "episodes_daily.json");
        assert_eq!(podcast_record_key("daily"), "podcast_daily.json");
    }

    #[tokio::test]
    async fn test_missing_catalog_and_index_are_empty() {
        let store = test_store().await;
        assert!(load_podcasts(&store).await.unwrap().is_empty());
        assert!(load_episode_index(&store, "daily").await.unwrap().is_empty());
        assert!(load_podcast_record(&store, "daily").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_podcasts_round_trip() {
        let store = test_store().await;
        let podcasts = vec![
            PodcastSource::new("a", "https://a.example.com/feed"),
            PodcastSource::new("b", "https://b.example.com/feed"),
        ];
        put_json(&store, CONFIG_BUCKET, PODCASTS_KEY, &podcasts)
            .await
            .unwrap();
        assert_eq!(load_podcasts(&store).await.unwrap(), podcasts);
    }

    #[tokio::test]
    async fn test_corrupt_index_is_error() {
        let store = test_store().await;
        store
            .put(CONFIG_BUCKET, &episode_index_key("daily"), b"[{\"id\":")
            .await
            .unwrap();
        assert!(load_episode_index(&store, "daily").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_podcast_data() {
        let store = test_store().await;
        save_episode_index(&store, "daily", &[]).await.unwrap();
        assert!(remove_podcast_data(&store, "daily").await.unwrap());
        assert!(!remove_podcast_data(&store, "daily").await.unwrap());
    }
}
