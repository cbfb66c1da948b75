//! HTTP implementation of [`MetadataProvider`].

use std::time::Duration;

use reqwest::{StatusCode, Url};

use crate::{BookMetadata, LookupError, LookupFuture, MetadataProvider};

/// Client-side timeout for a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the metadata service at `GET {base_url}/books/isbn/{isbn}`.
#[derive(Debug, Clone)]
pub struct HttpMetadataProvider {
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpMetadataProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LookupError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| LookupError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(LookupError::InvalidUrl(base_url.to_string()));
        }

        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// URL of the lookup for `isbn`. The ISBN is one percent-encoded path
    /// segment, whatever characters it contains.
    fn isbn_url(&self, isbn: &str) -> Result<Url, LookupError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| LookupError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["books", "isbn", isbn]);
        Ok(url)
    }

    /// Fetch metadata for one ISBN.
    pub async fn get_by_isbn(&self, isbn: &str) -> Result<BookMetadata, LookupError> {
        let url = self.isbn_url(isbn)?;
        tracing::debug!("Looking up metadata: {}", url);

        let response = self.http_client.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound);
        }
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(LookupError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

impl MetadataProvider for HttpMetadataProvider {
    fn lookup<'a>(&'a self, isbn: &'a str) -> LookupFuture<'a> {
        Box::pin(self.get_by_isbn(isbn))
    }
}
