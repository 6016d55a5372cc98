use futures::StreamExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Write buffer size for audio downloads.
pub const DOWNLOAD_CHUNK: usize = 256 * 1024;

const PROGRESS_EVERY: u64 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Incomplete download: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: u64 },
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DownloadError::Timeout
        } else {
            DownloadError::Network(e)
        }
    }
}

/// Stream an audio file to `dest`, creating parent directories.
///
/// The body is written to a `.part` sibling and renamed into place only
/// once complete, so `dest` never holds a truncated file. Returns `dest`.
pub async fn download_episode(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<PathBuf, DownloadError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tracing::debug!(url = %url, dest = %dest.display(), "Downloading audio");
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus(response.status().as_u16()));
    }

    let part = part_path(dest);
    let result = match write_body(response, &part).await {
        Ok(written) => tokio::fs::rename(&part, dest)
            .await
            .map(|()| written)
            .map_err(DownloadError::from),
        Err(e) => Err(e),
    };

    match result {
        Ok(written) => {
            tracing::debug!(dest = %dest.display(), bytes = written, "Downloaded audio");
            Ok(dest.to_path_buf())
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %part.display(), error = %cleanup, "Failed to remove partial download");
                }
            }
            Err(e)
        }
    }
}

async fn write_body(response: reqwest::Response, part: &Path) -> Result<u64, DownloadError> {
    let expected = response.content_length();
    let file = tokio::fs::File::create(part).await?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK, file);
    let mut received: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        let before = received;
        received += chunk.len() as u64;
        if received / PROGRESS_EVERY > before / PROGRESS_EVERY {
            tracing::debug!(path = %part.display(), bytes = received, total = ?expected, "Download progress");
        }
    }
    writer.flush().await?;
    writer.into_inner().sync_all().await?;

    if let Some(expected) = expected {
        if received < expected {
            return Err(DownloadError::Incomplete { expected, received });
        }
    }

    Ok(received)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("podscrape_download_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/a/b/ep.mp3")),
            PathBuf::from("/a/b/ep.mp3.part")
        );
    }

    #[tokio::test]
    async fn test_download_writes_file_and_creates_dirs() {
        let server = MockServer::start().await;
        let body = vec![7u8; DOWNLOAD_CHUNK + 100];
        Mock::given(method("GET"))
            .and(path("/ep.mp3"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = test_dir("writes");
        let dest = dir.join("daily").join("abc.mp3");
        let client = reqwest::Client::new();
        let written = download_episode(&client, &format!("{}/ep.mp3", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!part_path(&dest).exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_download_replaces_existing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
            .mount(&server)
            .await;

        let dir = test_dir("replaces");
        std::fs::create_dir_all(&dir).unwrap();
        let dest = dir.join("ep.mp3");
        std::fs::write(&dest, b"old contents").unwrap();

        download_episode(&reqwest::Client::new(), &server.uri(), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_http_error_leaves_nothing_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = test_dir("http_error");
        let dest = dir.join("ep.mp3");
        let result = download_episode(&reqwest::Client::new(), &server.uri(), &dest).await;

        assert!(matches!(result, Err(DownloadError::HttpStatus(500))));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
