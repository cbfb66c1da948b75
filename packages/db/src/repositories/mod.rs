//! Repository implementations for database operations.

mod book_repo;

pub use book_repo::BookRepository;
