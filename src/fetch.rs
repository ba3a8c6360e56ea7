//! HTTP access to remote images.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("server returned HTTP {status}")]
    Status { status: StatusCode },
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedImage, FetchError>;
}

/// Fetches images with a browser-like user agent. One client is shared by
/// every request so connections get reused.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(&config.user_agent).build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedImage, FetchError> {
        log::trace!("GET {}", url);

        let response = self.client.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Serves canned responses keyed by URL; anything else is a 404.
    #[derive(Default)]
    pub struct FakeFetcher {
        responses: HashMap<String, FetchedImage>,
        pub requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn with(mut self, url: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Self {
            self.responses.insert(
                url.to_owned(),
                FetchedImage {
                    bytes,
                    content_type: content_type.map(str::to_owned),
                },
            );
            self
        }
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, _timeout: Duration) -> Result<FetchedImage, FetchError> {
            self.requested.lock().unwrap().push(url.to_owned());

            match self.responses.get(url) {
                Some(image) => Ok(image.clone()),
                None => Err(FetchError::Status {
                    status: StatusCode::NOT_FOUND,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_body_and_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pic.png")
            .match_header("user-agent", mockito::Matcher::Regex("Chrome".to_owned()))
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body([1u8, 2, 3])
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&Config::default()).unwrap();
        let image = fetcher
            .fetch(&format!("{}/pic.png", server.url()), Duration::from_secs(5))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.jpg")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&Config::default()).unwrap();
        let result = fetcher
            .fetch(
                &format!("{}/missing.jpg", server.url()),
                Duration::from_secs(5),
            )
            .await;

        match result {
            Err(FetchError::Status { status }) => assert_eq!(status, StatusCode::NOT_FOUND),
            other => panic!("expected a status error, got {:?}", other),
        }
    }
}
