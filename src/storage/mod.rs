//! Bucket/key object storage and the records the scraper keeps in it.
//!
//! - [`ObjectStore`] - the get/put/list/delete contract
//! - [`FileStore`] - one directory per bucket, atomic rename-on-write
//! - [`SqliteStore`] - one `objects` table, single-statement upserts
//! - [`catalog`] - podcast list, episode indexes and podcast records

pub mod catalog;
mod file_store;
mod object_store;
mod sqlite_store;
mod types;

pub use file_store::FileStore;
pub use object_store::{get_json, put_json, ObjectStore, Store};
pub use sqlite_store::SqliteStore;
pub use types::{validate_key, StoreError};
