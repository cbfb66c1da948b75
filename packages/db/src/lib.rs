//! SurrealDB persistence for books.
//!
//! This crate provides the database connection and the [`BookStore`]
//! collaborator the enrichment pipeline reads and writes books through.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
mod store;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, open};
pub use repositories::BookRepository;
pub use schema::init_schema;
pub use store::{BookStore, StoreFuture};

/// Open the database described by `config` and apply the schema.
///
/// Each call returns an independent handle; callers share it by cloning.
pub async fn connect(config: DbConfig) -> Result<Database, DbError> {
    let db = open(&config).await?;
    init_schema(&db).await?;
    Ok(db)
}
