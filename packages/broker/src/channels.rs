//! The two channels of the enrichment pipeline: the fetch-job queue and the
//! result event bus.

use std::sync::Arc;

use book_core::{
    BOOK_EVENTS_EXCHANGE, METADATA_FETCH_QUEUE, METADATA_FETCHED_ROUTING_KEY,
    METADATA_RESULTS_QUEUE, MetadataFetchJob, MetadataFetchedEvent,
};

use crate::{Broker, BrokerError, BrokerExt, Destination, MessageHandler, QueueSpec, Subscription};

/// Durable work queue of [`MetadataFetchJob`]s.
#[derive(Clone)]
pub struct JobQueue {
    broker: Arc<dyn Broker>,
    spec: QueueSpec,
}

impl JobQueue {
    /// Job queue on the standard `metadata_fetch` queue.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            spec: QueueSpec::durable(METADATA_FETCH_QUEUE),
        }
    }

    /// Publish a job. Fire-and-forget: success means the broker accepted it.
    pub async fn enqueue(&self, job: &MetadataFetchJob) -> Result<(), BrokerError> {
        let destination = Destination::Queue(self.spec.name.clone());
        self.broker.publish_json(&destination, job).await?;
        tracing::debug!("Enqueued metadata fetch for book {}", job.book_id);
        Ok(())
    }

    /// Start one competing consumer on the queue.
    pub async fn consume(&self, handler: Arc<dyn MessageHandler>) -> Result<Subscription, BrokerError> {
        self.broker.subscribe(&self.spec, handler).await
    }
}

/// Topic exchange carrying [`MetadataFetchedEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    broker: Arc<dyn Broker>,
    destination: Destination,
    results: QueueSpec,
}

impl EventBus {
    /// Event bus on `book_events` / `book.metadata_fetched`, consumed through
    /// the `api_metadata_results` queue.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            destination: Destination::topic(BOOK_EVENTS_EXCHANGE, METADATA_FETCHED_ROUTING_KEY),
            results: QueueSpec::durable(METADATA_RESULTS_QUEUE)
                .bound_to(BOOK_EVENTS_EXCHANGE, METADATA_FETCHED_ROUTING_KEY),
        }
    }

    pub fn results_queue(&self) -> &QueueSpec {
        &self.results
    }

    /// Publish a result. Succeeds even when no queue is bound yet.
    pub async fn publish_result(&self, event: &MetadataFetchedEvent) -> Result<(), BrokerError> {
        self.broker.publish_json(&self.destination, event).await?;
        tracing::debug!(
            "Published {} for book {}",
            book_core::METADATA_FETCHED_EVENT,
            event.book_id
        );
        Ok(())
    }

    /// Declare the results queue and binding, then consume it.
    pub async fn subscribe_results(
        &self,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription, BrokerError> {
        self.broker.subscribe(&self.results, handler).await
    }
}
