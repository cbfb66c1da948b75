use db::{BookRepository, DbConfig, DbError};

/// A repository on a fresh in-memory database.
pub async fn setup_repo() -> Result<BookRepository, DbError> {
    let db = db::connect(DbConfig::memory()).await?;
    Ok(BookRepository::new(db))
}
