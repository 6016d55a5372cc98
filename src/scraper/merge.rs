use chrono::{DateTime, Utc};
use serde_json::Map;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::feed::RawFeedEntry;
use crate::model::{Episode, EpisodeStatus};

const EPISODE_ID_LEN: usize = 16;

/// Stable episode id: the first 16 hex chars of
/// `sha256("{podcast_id}:{title}:{published}")`.
pub fn generate_episode_id(podcast_id: &str, title: &str, published: &str) -> String {
    let digest = Sha256::digest(format!("{podcast_id}:{title}:{published}").as_bytes());
    let mut id = format!("{:x}", digest);
    id.truncate(EPISODE_ID_LEN);
    id
}

/// Append every candidate not already in `index`, in feed order.
///
/// Entries with a guid are matched on guid. Entries without one are matched
/// on their generated id. Returns how many were admitted; they are the last
/// entries of `index`.
pub fn merge_entries(
    index: &mut Vec<Episode>,
    podcast_id: &str,
    candidates: &[RawFeedEntry],
    scraped_at: DateTime<Utc>,
) -> usize {
    let mut seen_guids: HashSet<String> = index
        .iter()
        .filter(|e| !e.guid.is_empty())
        .map(|e| e.guid.clone())
        .collect();
    let mut seen_ids: HashSet<String> = index.iter().map(|e| e.id.clone()).collect();

    let before = index.len();
    for entry in candidates {
        let id = generate_episode_id(podcast_id, &entry.title, &entry.published);

        let fresh = if entry.guid.is_empty() {
            !seen_ids.contains(&id)
        } else {
            seen_guids.insert(entry.guid.clone())
        };
        if !fresh {
            tracing::debug!(podcast = %podcast_id, guid = %entry.guid, id = %id, "Skipping known episode");
            continue;
        }
        seen_ids.insert(id.clone());

        index.push(Episode {
            id,
            podcast_id: podcast_id.to_string(),
            title: entry.title.clone(),
            description: entry.description.clone(),
            published: entry.published.clone(),
            audio_url: entry.audio_url.clone(),
            duration_seconds: entry.duration_seconds,
            guid: entry.guid.clone(),
            status: EpisodeStatus::Scraped,
            audio_local_path: None,
            audio_key: None,
            scraped_at,
            transcript: None,
            summary: None,
            transcript_key: None,
            summary_key: None,
            extra: Map::new(),
        });
    }

    index.len() - before
}
