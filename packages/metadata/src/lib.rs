//! Client for the external book metadata service.
//!
//! The pipeline only ever sees the [`MetadataProvider`] capability, so
//! workers and their tests can swap in a fake without touching broker
//! wiring.

mod client;
mod error;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub use client::HttpMetadataProvider;
pub use error::LookupError;

/// Future returned by [`MetadataProvider::lookup`].
pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = Result<BookMetadata, LookupError>> + Send + 'a>>;

/// Metadata as returned by the metadata service. Only `isbn` is guaranteed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub isbn: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub publish_date: Option<String>,
}

impl BookMetadata {
    pub fn new(isbn: impl Into<String>) -> Self {
        Self {
            isbn: isbn.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_total_pages(mut self, total_pages: u32) -> Self {
        self.total_pages = Some(total_pages);
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }
}

/// Anything that can resolve an ISBN to metadata.
pub trait MetadataProvider: Send + Sync + 'static {
    fn lookup<'a>(&'a self, isbn: &'a str) -> LookupFuture<'a>;
}
