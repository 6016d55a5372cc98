use chrono::SecondsFormat;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;

use super::extensions::{scan_entry_extensions, EntryExtensions};

const UNKNOWN_PODCAST: &str = "Unknown Podcast";
const UNTITLED_EPISODE: &str = "Untitled Episode";
const DEFAULT_LANGUAGE: &str = "en";
const AUDIO_SUFFIXES: [&str; 4] = [".mp3", ".m4a", ".wav", ".ogg"];

/// Podcast-level metadata taken from the feed channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodcastMeta {
    pub title: String,
    pub description: String,
    pub link: String,
    pub image: String,
    pub language: String,
}

/// One feed entry, normalized but not yet identified or deduplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeedEntry {
    pub title: String,
    pub description: String,
    /// RFC 3339 when the feed date parsed, otherwise the literal text
    pub published: String,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<i64>,
    /// Literal `<guid>`/`<id>`; empty when the feed has none
    pub guid: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub podcast: PodcastMeta,
    /// Entries in feed order
    pub episodes: Vec<RawFeedEntry>,
}

/// Result of parsing a feed document.
///
/// `Empty` covers documents that are not RSS/Atom at all. A feed that parses
/// but lists no items is `Parsed` with no episodes.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedParseOutcome {
    Empty,
    Parsed(ParsedFeed),
}

/// feed-rs parser that leaves missing ids empty instead of generating
/// random ones, so an entry without a guid reads the same on every parse.
fn feed_parser() -> parser::Parser {
    parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
}

pub fn parse_feed_bytes(bytes: &[u8]) -> FeedParseOutcome {
    let feed = match feed_parser().parse(bytes) {
        Ok(feed) => feed,
        Err(e) => {
            tracing::error!(error = %e, "Feed could not be parsed");
            return FeedParseOutcome::Empty;
        }
    };

    let extensions = scan_entry_extensions(bytes);
    // Raw values are matched to feed-rs entries by position; on any disagreement
    // fall back to what feed-rs exposes
    let aligned = extensions.len() == feed.entries.len();
    if !aligned {
        tracing::warn!(
            entries = feed.entries.len(),
            scanned = extensions.len(),
            "Entry scan disagrees with parsed feed; using parsed values only"
        );
    }

    let podcast = podcast_meta(&feed);
    let episodes = feed
        .entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let ext = if aligned { extensions.get(i) } else { None };
            build_entry(entry, ext)
        })
        .collect();

    FeedParseOutcome::Parsed(ParsedFeed { podcast, episodes })
}

fn podcast_meta(feed: &Feed) -> PodcastMeta {
    let title = feed
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_PODCAST.to_string());
    let description = feed
        .description
        .as_ref()
        .map(|d| d.content.clone())
        .unwrap_or_default();
    let link = feed
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or(feed.links.first())
        .map(|l| l.href.clone())
        .unwrap_or_default();
    let image = feed
        .logo
        .as_ref()
        .or(feed.icon.as_ref())
        .map(|img| img.uri.clone())
        .unwrap_or_default();
    let language = feed
        .language
        .clone()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    PodcastMeta {
        title,
        description,
        link,
        image,
        language,
    }
}

fn build_entry(entry: Entry, ext: Option<&EntryExtensions>) -> RawFeedEntry {
    let audio_url = extract_audio_url(&entry);

    let duration_seconds = match ext.and_then(EntryExtensions::duration) {
        Some(literal) => parse_duration(literal),
        None => media_duration(&entry),
    };

    let published = match entry.published {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, false),
        None => ext
            .and_then(|e| e.published.clone())
            .unwrap_or_default(),
    };

    let guid = match ext {
        Some(e) => e.guid.clone(),
        None => entry.id.trim().to_string(),
    };

    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED_EPISODE.to_string());

    let description = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .unwrap_or_default();

    RawFeedEntry {
        title,
        description,
        published,
        audio_url,
        duration_seconds,
        guid,
    }
}

fn media_duration(entry: &Entry) -> Option<i64> {
    entry
        .media
        .iter()
        .find_map(|m| {
            m.duration
                .or_else(|| m.content.iter().find_map(|c| c.duration))
        })
        .map(|d| d.as_secs() as i64)
}

/// First audio URL of an entry: links are checked before enclosures.
pub fn extract_audio_url(entry: &Entry) -> Option<String> {
    for link in &entry.links {
        if !link.href.is_empty() && is_audio(&link.href, link.media_type.as_deref()) {
            return Some(link.href.clone());
        }
    }

    for media in &entry.media {
        for content in &media.content {
            let Some(url) = &content.url else { continue };
            let mime = content.content_type.as_ref().map(|m| m.to_string());
            if is_audio(url.as_str(), mime.as_deref()) {
                return Some(url.to_string());
            }
        }
    }

    None
}

fn is_audio(href: &str, media_type: Option<&str>) -> bool {
    media_type.is_some_and(|t| t.contains("audio")) || has_audio_suffix(href)
}

/// Suffix check against the URL path, so `ep.mp3?token=..` still counts.
fn has_audio_suffix(href: &str) -> bool {
    let path = match url::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    AUDIO_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

/// Parse an `itunes:duration` style value into seconds.
///
/// Accepts plain seconds, `MM:SS` and `HH:MM:SS`. Anything else is `None`.
pub fn parse_duration(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().ok();
    }

    let parts: Vec<i64> = value
        .split(':')
        .map(|part| part.trim().parse::<i64>())
        .collect::<Result<_, _>>()
        .ok()?;

    match parts.as_slice() {
        [h, m, s] => h
            .checked_mul(3600)?
            .checked_add(m.checked_mul(60)?)?
            .checked_add(*s),
        [m, s] => m.checked_mul(60)?.checked_add(*s),
        _ => None,
    }
}
