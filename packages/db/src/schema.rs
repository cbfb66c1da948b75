//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// Idempotent: every definition is `IF NOT EXISTS`.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(BOOK_SCHEMA).await?.check()?;
    db.query(COUNTER_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Book table schema. Records are keyed `book:<id>`.
const BOOK_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS book SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS book_id ON book TYPE int;
DEFINE FIELD IF NOT EXISTS user_id ON book TYPE option<int>;
DEFINE FIELD IF NOT EXISTS isbn ON book TYPE string;
DEFINE FIELD IF NOT EXISTS title ON book TYPE string;
DEFINE FIELD IF NOT EXISTS total_pages ON book TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS author ON book TYPE option<string>;
DEFINE FIELD IF NOT EXISTS publisher ON book TYPE option<string>;
DEFINE FIELD IF NOT EXISTS created_at ON book TYPE datetime DEFAULT time::now();
DEFINE FIELD IF NOT EXISTS updated_at ON book TYPE datetime VALUE time::now();

DEFINE INDEX IF NOT EXISTS book_isbn ON book FIELDS isbn;
DEFINE INDEX IF NOT EXISTS book_user ON book FIELDS user_id;
"#;

/// Id allocation counters, one record per table.
const COUNTER_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS counter SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS last_id ON counter TYPE int DEFAULT 0;
"#;
