//! Result application: persist successful enrichments and notify live
//! clients.

use std::sync::Arc;

use book_core::{Book, METADATA_FETCHED_EVENT, MetadataFetchedEvent};
use broker::Delivery;
use db::{BookStore, DbError};
use realtime::NotificationHub;

/// Consumer errors. Any of these leaves the result unacked so it is
/// applied again on redelivery.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("failed to persist metadata for book {book_id}: {source}")]
    Persistence {
        book_id: book_core::BookId,
        #[source]
        source: DbError,
    },
}

/// What happened to one delivered result event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The book was updated and broadcast.
    Applied(Book),
    /// A failed lookup; nothing to apply.
    Skipped,
    /// The book no longer exists.
    BookMissing,
    /// The message was not a result event.
    Discarded,
}

/// Applies result events to books.
pub struct ResultConsumer {
    store: Arc<dyn BookStore>,
    hub: Arc<NotificationHub>,
}

impl ResultConsumer {
    pub fn new(store: Arc<dyn BookStore>, hub: Arc<NotificationHub>) -> Self {
        Self { store, hub }
    }

    /// Apply one result event.
    ///
    /// Safe to call repeatedly with the same event: the stored book ends in
    /// the same state every time.
    pub async fn apply(&self, event: &MetadataFetchedEvent) -> Result<ConsumeOutcome, ConsumerError> {
        if !event.success {
            tracing::warn!("{}", event.description());
            return Ok(ConsumeOutcome::Skipped);
        }

        let persistence = |source| ConsumerError::Persistence {
            book_id: event.book_id,
            source,
        };

        let mut book = match self.store.get(event.book_id).await {
            Ok(book) => book,
            Err(DbError::NotFound(_)) => {
                tracing::warn!("Book {} not found, dropping metadata result", event.book_id);
                return Ok(ConsumeOutcome::BookMissing);
            }
            Err(e) => return Err(persistence(e)),
        };

        book.apply_metadata(event);
        let book = self.store.update(&book).await.map_err(persistence)?;
        tracing::info!("Applied metadata to book {}: {}", book.id, book.title);

        match self.hub.broadcast(METADATA_FETCHED_EVENT, &book) {
            Ok(report) => tracing::debug!(
                "Notified {} subscribers of book {} ({} dropped)",
                report.delivered,
                book.id,
                report.dropped
            ),
            Err(e) => tracing::warn!("Failed to broadcast book {}: {}", book.id, e),
        }

        Ok(ConsumeOutcome::Applied(book))
    }

    /// Decode and apply one delivery from the results queue.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<ConsumeOutcome, ConsumerError> {
        let event: MetadataFetchedEvent = match serde_json::from_slice(&delivery.body) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!("Discarding undecodable result message: {}", e);
                return Ok(ConsumeOutcome::Discarded);
            }
        };

        self.apply(&event).await
    }
}
