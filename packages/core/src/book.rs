//! Book domain types.

use serde::{Deserialize, Serialize};

use crate::MetadataFetchedEvent;

/// Maximum title length accepted from clients.
const MAX_TITLE_LEN: usize = 500;

/// Identifier of a persisted book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub i64);

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for BookId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A book as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub isbn: String,
    pub title: String,
    pub total_pages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

impl Book {
    /// Overwrite the enrichable fields from a successful result.
    ///
    /// Every field is replaced, never accumulated, so applying the same
    /// event twice leaves the book exactly as applying it once.
    pub fn apply_metadata(&mut self, event: &MetadataFetchedEvent) {
        self.title = event.title.clone();
        self.total_pages = event.total_pages;
        if let Some(author) = &event.author {
            self.author = Some(author.clone());
        }
        if let Some(publisher) = &event.publisher {
            self.publisher = Some(publisher.clone());
        }
    }
}

/// A book submitted by a client, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub isbn: String,
    /// Placeholder title until enrichment fills it in.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub total_pages: u32,
}

impl NewBook {
    pub fn new(isbn: impl Into<String>) -> Self {
        Self {
            user_id: None,
            isbn: isbn.into(),
            title: String::new(),
            total_pages: 0,
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Check the fields a client controls.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.isbn.trim().is_empty() {
            return Err(ValidationError::new("isbn cannot be empty"));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::new("title cannot exceed 500 characters"));
        }
        Ok(())
    }

    /// Attach an allocated id.
    pub fn into_book(self, id: BookId) -> Book {
        Book {
            id,
            user_id: self.user_id,
            isbn: self.isbn,
            title: self.title,
            total_pages: self.total_pages,
            author: None,
            publisher: None,
        }
    }
}

/// Rejected client input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid input: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
