//! Persisted records shared by the scraper and downstream processing.
//!
//! All records are stored as JSON. Fields this crate does not know about
//! (written by the API layer, transcription or summarization) are kept in a
//! flattened `extra` map so a read-modify-write never drops them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::feed::PodcastMeta;

// ============================================================================
// Podcast Source
// ============================================================================

fn default_active() -> bool {
    true
}

/// A tracked podcast as configured in the catalog. Read-only to the scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodcastSource {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub feed_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Per-podcast override of the configured episode cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_episodes_per_feed: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PodcastSource {
    pub fn new(id: impl Into<String>, feed_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            feed_url: Some(feed_url.into()),
            active: true,
            max_episodes_per_feed: None,
            extra: Map::new(),
        }
    }

    /// The feed URL, treating blank strings as missing.
    pub fn feed_url(&self) -> Option<&str> {
        self.feed_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

// ============================================================================
// Podcast Record
// ============================================================================

/// Podcast-level metadata written after each successful scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodcastRecord {
    #[serde(flatten)]
    pub source: PodcastSource,
    pub feed_title: String,
    pub feed_description: String,
    pub feed_image: String,
    pub last_scraped: DateTime<Utc>,
    pub episode_count: usize,
}

impl PodcastRecord {
    const OWN_FIELDS: [&'static str; 5] = [
        "feed_title",
        "feed_description",
        "feed_image",
        "last_scraped",
        "episode_count",
    ];

    pub fn new(
        source: &PodcastSource,
        meta: &PodcastMeta,
        episode_count: usize,
        last_scraped: DateTime<Utc>,
    ) -> Self {
        let mut source = source.clone();
        // Catalog entries may carry stale copies of these; the record's own fields win
        for field in Self::OWN_FIELDS {
            source.extra.remove(field);
        }

        Self {
            source,
            feed_title: meta.title.clone(),
            feed_description: meta.description.clone(),
            feed_image: meta.image.clone(),
            last_scraped,
            episode_count,
        }
    }
}

// ============================================================================
// Episode
// ============================================================================

/// Processing stage of an episode. The scraper only ever writes `Scraped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    Scraped,
    Transcribed,
    Summarized,
}

impl EpisodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStatus::Scraped => "scraped",
            EpisodeStatus::Transcribed => "transcribed",
            EpisodeStatus::Summarized => "summarized",
        }
    }
}

/// One episode in a podcast's persisted index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// 16 lowercase hex chars derived from podcast id, title and published
    pub id: String,
    pub podcast_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub published: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub guid: String,
    pub status: EpisodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_local_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_key: Option<String>,
    pub scraped_at: DateTime<Utc>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_key: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Episode {
    /// Local audio is recorded and the file is present on disk.
    pub fn is_ready_for_transcription(&self) -> bool {
        self.audio_local_path
            .as_deref()
            .is_some_and(|path| path.is_file())
    }

    /// A non-blank transcript is attached.
    pub fn is_ready_for_summarization(&self) -> bool {
        self.transcript
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_episode() -> Episode {
        Episode {
            id: "0123456789abcdef".into(),
            podcast_id: "daily".into(),
            title: "Ep 1".into(),
            description: String::new(),
            published: "2024-01-01T00:00:00+00:00".into(),
            audio_url: Some("https://cdn.example.com/ep1.mp3".into()),
            duration_seconds: Some(60),
            guid: "g1".into(),
            status: EpisodeStatus::Scraped,
            audio_local_path: None,
            audio_key: None,
            scraped_at: "2024-01-02T00:00:00Z".parse().unwrap(),
            transcript: None,
            summary: None,
            transcript_key: None,
            summary_key: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_source_defaults() {
        let source: PodcastSource =
            serde_json::from_value(json!({"id": "daily", "feed_url": "https://x/feed"})).unwrap();
        assert!(source.active);
        assert_eq!(source.feed_url(), Some("https://x/feed"));
        assert!(source.max_episodes_per_feed.is_none());
    }

    #[test]
    fn test_blank_feed_url_is_missing() {
        let mut source = PodcastSource::new("daily", "   ");
        assert_eq!(source.feed_url(), None);
        source.feed_url = None;
        assert_eq!(source.feed_url(), None);
    }

    #[test]
    fn test_source_keeps_unknown_fields() {
        let raw = json!({"id": "daily", "feed_url": "u", "category": "news", "active": false});
        let source: PodcastSource = serde_json::from_value(raw).unwrap();
        assert!(!source.active);
        assert_eq!(source.extra.get("category"), Some(&json!("news")));

        let back = serde_json::to_value(&source).unwrap();
        assert_eq!(back["category"], json!("news"));
    }

    #[test]
    fn test_record_drops_stale_catalog_copies() {
        let raw = json!({"id": "daily", "feed_url": "u", "last_scraped": null, "episode_count": 0});
        let source: PodcastSource = serde_json::from_value(raw).unwrap();
        let meta = PodcastMeta {
            title: "The Daily".into(),
            ..PodcastMeta::default()
        };
        let now: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();

        let record = PodcastRecord::new(&source, &meta, 7, now);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["episode_count"], json!(7));
        assert_eq!(value["feed_title"], json!("The Daily"));
        assert_eq!(value["id"], json!("daily"));

        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text.matches("\"last_scraped\"").count(), 1);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(EpisodeStatus::Scraped).unwrap(), json!("scraped"));
        let status: EpisodeStatus = serde_json::from_value(json!("summarized")).unwrap();
        assert_eq!(status, EpisodeStatus::Summarized);
        assert_eq!(status.as_str(), "summarized");
    }

    #[test]
    fn test_episode_keeps_downstream_fields() {
        let mut value = serde_json::to_value(sample_episode()).unwrap();
        value["word_count"] = json!(1234);
        value["transcript_key"] = json!("daily/0123456789abcdef.txt");

        let episode: Episode = serde_json::from_value(value).unwrap();
        assert_eq!(episode.transcript_key.as_deref(), Some("daily/0123456789abcdef.txt"));
        assert_eq!(episode.extra.get("word_count"), Some(&json!(1234)));

        let back = serde_json::to_value(&episode).unwrap();
        assert_eq!(back["word_count"], json!(1234));
    }

    #[test]
    fn test_readiness() {
        let mut episode = sample_episode();
        assert!(!episode.is_ready_for_transcription());
        assert!(!episode.is_ready_for_summarization());

        episode.audio_local_path = Some(PathBuf::from("/definitely/not/here.mp3"));
        assert!(!episode.is_ready_for_transcription());

        let dir = std::env::temp_dir().join("podscrape_model_readiness");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("ep.mp3");
        std::fs::write(&file, b"ID3").unwrap();
        episode.audio_local_path = Some(file);
        assert!(episode.is_ready_for_transcription());

        episode.transcript = Some("   ".into());
        assert!(!episode.is_ready_for_summarization());
        episode.transcript = Some("Hello".into());
        assert!(episode.is_ready_for_summarization());

        std::fs::remove_dir_all(&dir).ok();
    }
}
