//! The persistence contract used by the producer path and the event consumer.

use std::future::Future;
use std::pin::Pin;

use book_core::{Book, BookId, NewBook};

use crate::DbError;

/// Future returned by [`BookStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DbError>> + Send + 'a>>;

/// Point reads and writes of book records.
pub trait BookStore: Send + Sync + 'static {
    /// Persist a new book under a freshly allocated id.
    fn create(&self, book: NewBook) -> StoreFuture<'_, Book>;

    /// Fetch a book. Missing books are `DbError::NotFound`.
    fn get(&self, id: BookId) -> StoreFuture<'_, Book>;

    /// Overwrite a stored book with `book`. Missing books are `DbError::NotFound`.
    fn update<'a>(&'a self, book: &'a Book) -> StoreFuture<'a, Book>;
}
