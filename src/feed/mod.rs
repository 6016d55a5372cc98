//! Podcast feed retrieval, parsing and audio download.
//!
//! - [`parser`] - RSS/Atom to [`PodcastMeta`] and [`RawFeedEntry`] via `feed-rs`
//! - `extensions` - literal `guid`/`itunes:duration`/`pubDate` values via `quick-xml`
//! - [`fetcher`] - bounded HTTP retrieval of feed documents
//! - [`download`] - streaming audio download with atomic placement
//!
//! # Example
//!
//! ```ignore
//! use podscrape::feed::{build_client, parse_feed, FeedParseOutcome};
//!
//! let client = build_client(&config)?;
//! if let FeedParseOutcome::Parsed(feed) = parse_feed(&client, url, limit).await? {
//!     println!("{}: {} episodes", feed.podcast.title, feed.episodes.len());
//! }
//! ```

pub mod download;
mod extensions;
pub mod fetcher;
pub mod parser;

pub use download::{download_episode, DownloadError, DOWNLOAD_CHUNK};
pub use fetcher::{build_client, fetch_feed_bytes, parse_feed, FetchError};
pub use parser::{
    extract_audio_url, parse_duration, parse_feed_bytes, FeedParseOutcome, ParsedFeed,
    PodcastMeta, RawFeedEntry,
};
