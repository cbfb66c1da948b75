//! Result events published on the event bus.

use serde::{Deserialize, Serialize};

use crate::{BookId, MetadataFetchJob};

/// Stream event name used when an enriched book is pushed to live clients.
pub const METADATA_FETCHED_EVENT: &str = "book.metadata_fetched";

/// Outcome of one attempt to enrich a job, successful or not.
///
/// Immutable once published. Consumers must tolerate receiving the same
/// event more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFetchedEvent {
    pub book_id: BookId,
    pub isbn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MetadataFetchedEvent {
    /// Build a successful result for `job`.
    pub fn succeeded(
        job: &MetadataFetchJob,
        title: impl Into<String>,
        total_pages: u32,
        author: Option<String>,
        publisher: Option<String>,
    ) -> Self {
        Self {
            book_id: job.book_id,
            isbn: job.isbn.clone(),
            title: title.into(),
            total_pages,
            author,
            publisher,
            success: true,
            error: None,
        }
    }

    /// Build a failed result for `job`. `error` should be human readable.
    pub fn failed(job: &MetadataFetchJob, error: impl Into<String>) -> Self {
        Self {
            book_id: job.book_id,
            isbn: job.isbn.clone(),
            title: String::new(),
            total_pages: 0,
            author: None,
            publisher: None,
            success: false,
            error: Some(error.into()),
        }
    }

    /// Short description for logging.
    pub fn description(&self) -> String {
        if self.success {
            format!(
                "Book {} enriched: {} ({} pages)",
                self.book_id, self.title, self.total_pages
            )
        } else {
            format!(
                "Book {} enrichment failed: {}",
                self.book_id,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}
