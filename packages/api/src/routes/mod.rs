//! HTTP routes.

mod books;
mod events;
mod health;

use axum::Router;

use crate::state::AppState;

/// Build the application router.
///
/// Routes:
/// - GET /events?token=... - Live stream of enrichment results
/// - POST /books - Create a book and request its metadata
/// - GET /books/{id} - Fetch one book
/// - GET /health - Liveness check
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(events::router())
        .merge(books::router())
        .merge(health::router())
        .with_state(state)
}
