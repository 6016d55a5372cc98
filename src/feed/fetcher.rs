use futures::StreamExt;
use thiserror::Error;

use super::parser::{parse_feed_bytes, FeedParseOutcome};
use crate::config::Config;

/// Errors that can occur while retrieving a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Connect or read timeout elapsed
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the configured feed size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e)
        }
    }
}

/// Build the shared HTTP client used for feeds and audio.
///
/// The read timeout applies per read, so long audio downloads are fine as
/// long as bytes keep arriving.
pub fn build_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout())
        .read_timeout(config.read_timeout())
        .build()
}

/// GET a feed and return its body, bounded by `limit` bytes.
pub async fn fetch_feed_bytes(
    client: &reqwest::Client,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }
    read_limited_bytes(response, limit).await
}

/// Fetch and parse a feed.
///
/// Transport failures are errors. A body that is not a feed is
/// `Ok(FeedParseOutcome::Empty)` so the caller decides how to report it.
pub async fn parse_feed(
    client: &reqwest::Client,
    url: &str,
    limit: usize,
) -> Result<FeedParseOutcome, FetchError> {
    tracing::info!(feed = %url, "Parsing feed");
    let bytes = fetch_feed_bytes(client, url, limit).await?;
    let outcome = parse_feed_bytes(&bytes);

    match &outcome {
        FeedParseOutcome::Parsed(feed) => tracing::info!(
            feed = %url,
            title = %feed.podcast.title,
            episodes = feed.episodes.len(),
            "Parsed feed"
        ),
        FeedParseOutcome::Empty => {
            tracing::warn!(feed = %url, bytes = bytes.len(), "Feed yielded no entries")
        }
    }

    Ok(outcome)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Test Cast</title>
    <item><guid>1</guid><title>Test</title>
      <enclosure url="https://cdn.example.com/1.mp3" type="audio/mpeg" length="1"/></item>
</channel></rss>"#;

    fn client() -> reqwest::Client {
        build_client(&Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_parse_feed_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/feed.xml", server.uri());
        let outcome = parse_feed(&client(), &url, 1024 * 1024).await.unwrap();
        match outcome {
            FeedParseOutcome::Parsed(feed) => {
                assert_eq!(feed.podcast.title, "Test Cast");
                assert_eq!(feed.episodes.len(), 1);
                assert_eq!(feed.episodes[0].guid, "1");
            }
            FeedParseOutcome::Empty => panic!("expected entries"),
        }
    }

    #[tokio::test]
    async fn test_404_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = parse_feed(&client(), &server.uri(), 1024).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn test_500_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = parse_feed(&client(), &server.uri(), 1024).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_malformed_body_is_empty_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not a feed</html>"))
            .mount(&server)
            .await;

        let outcome = parse_feed(&client(), &server.uri(), 1024).await.unwrap();
        assert_eq!(outcome, FeedParseOutcome::Empty);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let result = fetch_feed_bytes(&client(), &server.uri(), 1024).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let result = fetch_feed_bytes(&client(), "http://127.0.0.1:9/feed", 1024).await;
        assert!(matches!(
            result,
            Err(FetchError::Network(_)) | Err(FetchError::Timeout)
        ));
    }
}
