use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by object store backends.
///
/// A missing object is never an error: `get` returns `Ok(None)` and
/// `delete` returns `Ok(false)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bucket or key failed validation (empty, `..`, hidden or absolute segments)
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Filesystem backend I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite backend failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration of the SQLite schema failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Stored object could not be decoded as (or encoded to) JSON
    #[error("Malformed JSON in {bucket}/{key}: {source}")]
    Json {
        bucket: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Key Validation
// ============================================================================

/// Validates a bucket name or object key.
///
/// Keys are `/`-separated relative paths. Every segment must be non-empty,
/// must not be `.` or `..`, and must not start with a dot (the file backend
/// reserves hidden names for in-flight temporary files). Backslashes and NUL
/// bytes are rejected so a key can never escape its bucket on any platform.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("empty key".to_string()));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment.starts_with('.') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
    }
    Ok(())
}
