use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::error::RelayError;

/// Body and declared content type of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedResponse {
    pub fn new(body: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.map(str::to_string),
        }
    }
}

/// Retrieves the current content of a watched endpoint
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Non-2xx responses, transport errors and timeouts are all `RelayError::Fetch`
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, RelayError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Every request is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedResponse, RelayError> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::fetch(url, format!("status {}", status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::fetch(url, e))?;

        Ok(FetchedResponse::new(body.to_vec(), content_type.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    #[tokio::test]
    async fn test_fetch_returns_body_and_content_type() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/feed");
            then.status(200)
                .header("content-type", "application/json; charset=utf-8")
                .body(r#"{"id":"1"}"#);
        });

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let response = fetcher.fetch(&server.url("/feed")).await.unwrap();

        mock.assert();
        assert_eq!(response.body, br#"{"id":"1"}"#.to_vec());
        assert_eq!(
            response.content_type.as_deref(),
            Some("application/json; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/down");
            then.status(503).body("maintenance");
        });

        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&server.url("/down")).await.unwrap_err();
        match err {
            RelayError::Fetch { reason, .. } => assert!(reason.contains("503")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(3)).body("late");
        });

        let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();
        let err = fetcher.fetch(&server.url("/slow")).await.unwrap_err();
        assert!(matches!(err, RelayError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:9/nothing").await.unwrap_err();
        assert!(matches!(err, RelayError::Fetch { .. }));
    }
}
