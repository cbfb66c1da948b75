//! Book creation and lookup.
//!
//! Creating a book is the producer side of the pipeline: the book is stored
//! first, then a metadata fetch job is enqueued for it.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use book_core::{Book, BookId, MetadataFetchJob, NewBook};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /books
///
/// A failed enqueue is logged and not reported: the book exists, it just
/// never gets enriched.
async fn create_book(
    State(state): State<AppState>,
    Json(new_book): Json<NewBook>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    new_book.validate()?;
    let book = state.store.create(new_book).await?;
    tracing::info!("Created book {} ({})", book.id, book.isbn);

    let job = MetadataFetchJob::new(book.id, book.isbn.clone());
    if let Err(e) = state.jobs.enqueue(&job).await {
        tracing::warn!("Failed to enqueue metadata fetch for book {}: {}", book.id, e);
    }

    Ok((StatusCode::CREATED, Json(book)))
}

/// GET /books/{id}
async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Book>, ApiError> {
    let id = BookId(id);
    match state.store.get(id).await {
        Ok(book) => Ok(Json(book)),
        Err(db::DbError::NotFound(_)) => Err(ApiError::BookNotFound(id)),
        Err(e) => Err(e.into()),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/books", post(create_book))
        .route("/books/{id}", get(get_book))
}
