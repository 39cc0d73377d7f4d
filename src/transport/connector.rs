//! Opening the event stream.
//!
//! [`StreamConnector`] is the seam between the transport's state machine and
//! the network. [`HttpConnector`] is the production implementation: a
//! streaming `GET` decoded with [`SseDecoder`]. Tests substitute scripted
//! connectors.

// Rust guideline compliant 2026-02

use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use crate::constants;
use crate::sse::{SseDecoder, SseFrame};

/// Stream of decoded frames. An `Err` item or the end of the stream both
/// count as a transport failure.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame>> + Send>>;

/// Opens event streams for the transport.
#[async_trait]
pub trait StreamConnector: Send + Sync + std::fmt::Debug {
    /// Open a stream at `url`, authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails.
    async fn open(&self, url: &str, token: &str) -> Result<FrameStream>;
}

/// Build the stream URL with the token as a query parameter.
///
/// The result carries the credential; keep it out of logs and errors.
///
/// # Errors
///
/// Returns an error if `url` is not a valid absolute URL.
pub fn authenticated_url(url: &str, token: &str) -> Result<reqwest::Url> {
    reqwest::Url::parse_with_params(url, &[(constants::TOKEN_QUERY_PARAM, token)])
        .with_context(|| format!("invalid stream URL: {url}"))
}

/// `text/event-stream` over HTTP(S) using reqwest.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    handshake_timeout: Duration,
}

impl HttpConnector {
    /// Create a connector with the default client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (TLS backend).
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(constants::STREAM_CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::with_client(client))
    }

    /// Create a connector around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            handshake_timeout: constants::STREAM_HANDSHAKE_TIMEOUT,
        }
    }

    /// Bound the wait for response headers (default
    /// [`constants::STREAM_HANDSHAKE_TIMEOUT`]).
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

#[async_trait]
impl StreamConnector for HttpConnector {
    async fn open(&self, url: &str, token: &str) -> Result<FrameStream> {
        let request_url = authenticated_url(url, token)?;

        let request = self
            .client
            .get(request_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send();

        let response = tokio::time::timeout(self.handshake_timeout, request)
            .await
            .map_err(|elapsed| {
                anyhow::Error::new(elapsed).context(format!(
                    "event stream handshake timed out after {}ms: {url}",
                    self.handshake_timeout.as_millis()
                ))
            })?
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("event stream connect failed: {url}"))?
            .error_for_status()
            .map_err(reqwest::Error::without_url)
            .context("event stream rejected")?;

        let mut decoder = SseDecoder::new();
        let frames = response
            .bytes_stream()
            .map(move |chunk| -> Vec<Result<SseFrame>> {
                match chunk {
                    Ok(bytes) => match decoder.feed(&bytes) {
                        Ok(frames) => frames.into_iter().map(Ok).collect(),
                        Err(e) => vec![Err(e)],
                    },
                    Err(e) => vec![Err(anyhow::Error::new(e.without_url()).context("event stream read failed"))],
                }
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_url_encodes_token() {
        let url = authenticated_url(
            "http://localhost:8080/api/sse/delivery-status",
            "a b+c/=",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/sse/delivery-status?token=a+b%2Bc%2F%3D"
        );
    }

    #[test]
    fn test_authenticated_url_rejects_relative() {
        assert!(authenticated_url("/api/sse/delivery-status", "t").is_err());
    }

    #[tokio::test]
    async fn test_open_unreachable_host_returns_error() {
        let connector = HttpConnector::new().unwrap();
        let result = connector.open("http://127.0.0.1:1/stream", "t").await;
        assert!(result.is_err());
    }
}
