//! Book repository backed by SurrealDB.

use book_core::{Book, BookId, NewBook};
use serde::{Deserialize, Serialize};

use crate::{BookStore, Database, DbError, StoreFuture};

/// SurrealDB implementation of [`BookStore`].
#[derive(Clone)]
pub struct BookRepository {
    db: Database,
}

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct BookRecord {
    book_id: i64,
    #[serde(default)]
    user_id: Option<i64>,
    isbn: String,
    title: String,
    total_pages: u32,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
}

impl BookRecord {
    fn into_book(self) -> Book {
        Book {
            id: BookId(self.book_id),
            user_id: self.user_id,
            isbn: self.isbn,
            title: self.title,
            total_pages: self.total_pages,
            author: self.author,
            publisher: self.publisher,
        }
    }
}

/// Struct for writing books - omits datetime fields to use SurrealDB defaults.
#[derive(Debug, Clone, Serialize)]
struct BookContent {
    book_id: i64,
    user_id: Option<i64>,
    isbn: String,
    title: String,
    total_pages: u32,
    author: Option<String>,
    publisher: Option<String>,
}

impl From<&Book> for BookContent {
    fn from(book: &Book) -> Self {
        Self {
            book_id: book.id.0,
            user_id: book.user_id,
            isbn: book.isbn.clone(),
            title: book.title.clone(),
            total_pages: book.total_pages,
            author: book.author.clone(),
            publisher: book.publisher.clone(),
        }
    }
}

impl BookRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Allocate the next book id.
    async fn next_id(&self) -> Result<BookId, DbError> {
        let mut response = self
            .db
            .query("UPSERT counter:book SET last_id = (last_id ?? 0) + 1 RETURN VALUE last_id;")
            .await?;
        let id: Option<i64> = response.take(0)?;

        id.map(BookId)
            .ok_or_else(|| DbError::Query("Failed to allocate book id".into()))
    }

    /// Create a new book in the database.
    pub async fn create_book(&self, new_book: NewBook) -> Result<Book, DbError> {
        let id = self.next_id().await?;
        let book = new_book.into_book(id);

        let record: Option<BookRecord> = self
            .db
            .create(("book", id.0))
            .content(BookContent::from(&book))
            .await?;

        let created = record
            .map(BookRecord::into_book)
            .ok_or_else(|| DbError::Query("Failed to create book".into()))?;
        tracing::debug!("Created book {} ({})", created.id, created.isbn);
        Ok(created)
    }

    /// Get a book by ID.
    pub async fn get_book(&self, id: BookId) -> Result<Book, DbError> {
        let record: Option<BookRecord> = self.db.select(("book", id.0)).await?;

        record
            .map(BookRecord::into_book)
            .ok_or_else(|| DbError::NotFound(format!("Book not found: {}", id)))
    }

    /// Overwrite an existing book. Never creates one.
    pub async fn update_book(&self, book: &Book) -> Result<Book, DbError> {
        let record: Option<BookRecord> = self
            .db
            .update(("book", book.id.0))
            .merge(BookContent::from(book))
            .await?;

        record
            .map(BookRecord::into_book)
            .ok_or_else(|| DbError::NotFound(format!("Book not found: {}", book.id)))
    }
}

impl BookStore for BookRepository {
    fn create(&self, book: NewBook) -> StoreFuture<'_, Book> {
        Box::pin(self.create_book(book))
    }

    fn get(&self, id: BookId) -> StoreFuture<'_, Book> {
        Box::pin(self.get_book(id))
    }

    fn update<'a>(&'a self, book: &'a Book) -> StoreFuture<'a, Book> {
        Box::pin(self.update_book(book))
    }
}
