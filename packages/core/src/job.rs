//! The enrichment job carried on the job queue.

use serde::{Deserialize, Serialize};

use crate::BookId;

/// A unit of enrichment work.
///
/// Wire format: `{"book_id": int, "isbn": string}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFetchJob {
    pub book_id: BookId,
    pub isbn: String,
}

impl MetadataFetchJob {
    pub fn new(book_id: impl Into<BookId>, isbn: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            isbn: isbn.into(),
        }
    }
}
