//! Podcast feed scraping and idempotent episode ingestion.
//!
//! Feeds are fetched and parsed ([`feed`]), merged into per-podcast episode
//! indexes without duplicates ([`scraper`]) and persisted to an object store
//! ([`storage`]).

pub mod config;
pub mod feed;
pub mod model;
pub mod scraper;
pub mod storage;
