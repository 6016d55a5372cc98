//! Scrape orchestration: feed → dedup → audio → persisted index.
//!
//! - [`merge`] - guid/id deduplication and stable episode ids
//! - [`Scraper`] - runs the pipeline for one podcast or a whole catalog
//!
//! A scrape never fails as a whole. Every problem becomes a message in
//! [`ScrapeResult::errors`], and a failure in one podcast never stops the
//! rest of a batch.

pub mod merge;

use chrono::Utc;
use futures::{stream, FutureExt, StreamExt};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::config::Config;
use crate::feed::{download_episode, parse_feed, DownloadError, FeedParseOutcome, FetchError};
use crate::model::{Episode, PodcastRecord, PodcastSource};
use crate::storage::{catalog, validate_key, ObjectStore, StoreError};

pub use merge::{generate_episode_id, merge_entries};

const DEFAULT_AUDIO_EXT: &str = ".mp3";
const MAX_AUDIO_EXT_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("No feed URL")]
    NoFeedUrl,
    #[error("Invalid podcast id: {0:?}")]
    InvalidPodcastId(String),
    #[error("Feed fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Feed could not be parsed")]
    Unparseable,
    #[error("Episode index unreadable: {0}")]
    IndexLoad(#[source] StoreError),
    #[error("Failed to save episode index: {0}")]
    IndexSave(#[source] StoreError),
    #[error("Failed to save podcast record: {0}")]
    RecordSave(#[source] StoreError),
    #[error("Download failed: {title} -- {source}")]
    Download {
        title: String,
        #[source]
        source: DownloadError,
    },
    #[error("Scrape panicked: {0}")]
    Panicked(String),
}

/// Outcome of scraping one podcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeResult {
    pub podcast_id: String,
    pub new_episodes: usize,
    pub errors: Vec<String>,
}

impl ScrapeResult {
    fn new(podcast_id: &str) -> Self {
        Self {
            podcast_id: podcast_id.to_string(),
            new_episodes: 0,
            errors: Vec::new(),
        }
    }

    fn push_error(&mut self, error: ScrapeError) {
        self.errors.push(error.to_string());
    }
}

/// One async lock per podcast id, so read-modify-write of an index is
/// single-writer within the process.
#[derive(Default)]
struct PodcastLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PodcastLocks {
    async fn acquire(&self, podcast_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(podcast_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Runs scrapes against one store with one HTTP client and configuration.
pub struct Scraper<S> {
    store: S,
    client: reqwest::Client,
    config: Config,
    locks: PodcastLocks,
}

impl<S: ObjectStore> Scraper<S> {
    pub fn new(store: S, client: reqwest::Client, config: Config) -> Self {
        Self {
            store,
            client,
            config,
            locks: PodcastLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Scrape one podcast: fetch its feed, admit unseen episodes, download
    /// their audio and persist the index and podcast record.
    pub async fn scrape_podcast(&self, podcast: &PodcastSource) -> ScrapeResult {
        let mut result = ScrapeResult::new(&podcast.id);
        if let Err(e) = self.run(podcast, &mut result).await {
            tracing::warn!(podcast = %podcast.id, error = %e, "Scrape failed");
            result.push_error(e);
        }
        result
    }

    /// Scrape every podcast with bounded concurrency. Results are in input
    /// order; a panic in one podcast becomes an error for that podcast only.
    pub async fn scrape_all_podcasts(&self, podcasts: &[PodcastSource]) -> Vec<ScrapeResult> {
        let results: Vec<ScrapeResult> = stream::iter(podcasts)
            .map(|podcast| async move {
                match AssertUnwindSafe(self.scrape_podcast(podcast))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(&*panic);
                        tracing::error!(podcast = %podcast.id, panic = %message, "Scrape panicked");
                        let mut result = ScrapeResult::new(&podcast.id);
                        result.push_error(ScrapeError::Panicked(message));
                        result
                    }
                }
            })
            .buffered(self.config.scrape_concurrency())
            .collect()
            .await;

        let new_episodes: usize = results.iter().map(|r| r.new_episodes).sum();
        let errors: usize = results.iter().map(|r| r.errors.len()).sum();
        tracing::info!(
            podcasts = results.len(),
            new_episodes = new_episodes,
            errors = errors,
            "Batch scrape complete"
        );
        results
    }

    async fn run(&self, podcast: &PodcastSource, result: &mut ScrapeResult) -> Result<(), ScrapeError> {
        let feed_url = podcast.feed_url().ok_or(ScrapeError::NoFeedUrl)?;
        if !podcast.active {
            tracing::info!(podcast = %podcast.id, "Podcast is inactive, skipping");
            return Ok(());
        }
        // The id becomes a storage key fragment and a directory name
        if podcast.id.contains('/') || validate_key(&podcast.id).is_err() {
            return Err(ScrapeError::InvalidPodcastId(podcast.id.clone()));
        }

        let cap = podcast
            .max_episodes_per_feed
            .unwrap_or(self.config.max_episodes_per_feed);

        let feed = match parse_feed(&self.client, feed_url, self.config.max_feed_bytes).await? {
            FeedParseOutcome::Parsed(feed) => feed,
            FeedParseOutcome::Empty => return Err(ScrapeError::Unparseable),
        };
        let candidates = &feed.episodes[..feed.episodes.len().min(cap)];

        let _guard = self.locks.acquire(&podcast.id).await;

        let mut index = catalog::load_episode_index(&self.store, &podcast.id)
            .await
            .map_err(ScrapeError::IndexLoad)?;

        let added = merge_entries(&mut index, &podcast.id, candidates, Utc::now());
        let first_new = index.len() - added;

        if self.config.download_audio {
            for episode in &mut index[first_new..] {
                if let Err(e) = self.download_audio(episode).await {
                    tracing::warn!(podcast = %podcast.id, episode = %episode.id, error = %e, "Audio download failed");
                    result.push_error(e);
                }
            }
        }

        for episode in &index[first_new..] {
            tracing::info!(podcast = %podcast.id, episode = %episode.id, title = %episode.title, "New episode stored");
        }

        catalog::save_episode_index(&self.store, &podcast.id, &index)
            .await
            .map_err(ScrapeError::IndexSave)?;
        result.new_episodes = added;

        let record = PodcastRecord::new(podcast, &feed.podcast, index.len(), Utc::now());
        catalog::save_podcast_record(&self.store, &record)
            .await
            .map_err(ScrapeError::RecordSave)?;

        tracing::info!(
            podcast = %podcast.id,
            new_episodes = added,
            total = index.len(),
            errors = result.errors.len(),
            "Scrape complete"
        );
        Ok(())
    }

    /// Download an episode's audio, recording its path and key on success.
    async fn download_audio(&self, episode: &mut Episode) -> Result<(), ScrapeError> {
        let Some(url) = episode.audio_url.as_deref() else {
            return Ok(());
        };

        // Episodes that share an id share this file
        let file_name = format!("{}{}", episode.id, audio_extension(url));
        let dest = self
            .config
            .audio_dir()
            .join(&episode.podcast_id)
            .join(&file_name);

        match download_episode(&self.client, url, &dest).await {
            Ok(path) => {
                episode.audio_local_path = Some(path);
                episode.audio_key = Some(format!("{}/{}", episode.podcast_id, file_name));
                Ok(())
            }
            Err(source) => Err(ScrapeError::Download {
                title: episode.title.clone(),
                source,
            }),
        }
    }
}

/// File extension (with dot) of the audio URL's path, or `.mp3`.
///
/// Only short alphanumeric extensions are kept, since the result becomes
/// part of a file name.
pub fn audio_extension(audio_url: &str) -> String {
    let ext = url::Url::parse(audio_url).ok().and_then(|url| {
        Path::new(url.path())
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string)
    });

    match ext {
        Some(ext)
            if !ext.is_empty()
                && ext.len() <= MAX_AUDIO_EXT_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        }
        _ => DEFAULT_AUDIO_EXT.to_string(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
