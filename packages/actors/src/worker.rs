//! Enrichment work: turn one job into one published result event.

use std::sync::Arc;
use std::time::Duration;

use book_core::{MetadataFetchJob, MetadataFetchedEvent};
use book_metadata::{LookupError, MetadataProvider};
use broker::{BrokerError, Delivery, EventBus};

/// Default bound on a single provider lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker errors. Any of these leaves the job unacked so it is retried.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to publish result for book {book_id}: {source}")]
    Publish {
        book_id: book_core::BookId,
        #[source]
        source: BrokerError,
    },
}

/// What happened to one delivered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// A result event (successful or failed lookup) was published.
    Published(MetadataFetchedEvent),
    /// The message was not a job and can never become one.
    Discarded,
}

/// Performs lookups and reports every outcome on the event bus.
pub struct MetadataWorker {
    provider: Arc<dyn MetadataProvider>,
    bus: EventBus,
    lookup_timeout: Duration,
}

impl MetadataWorker {
    pub fn new(provider: Arc<dyn MetadataProvider>, bus: EventBus) -> Self {
        Self {
            provider,
            bus,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn lookup_timeout(&self) -> Duration {
        self.lookup_timeout
    }

    /// Look up `job` and build its result event. Never fails: every lookup
    /// failure becomes a `success = false` event.
    pub async fn fetch(&self, job: &MetadataFetchJob) -> MetadataFetchedEvent {
        let lookup = tokio::time::timeout(self.lookup_timeout, self.provider.lookup(&job.isbn)).await;

        let result = match lookup {
            Ok(Ok(metadata)) => match metadata.title {
                Some(title) if !title.trim().is_empty() => Ok(MetadataFetchedEvent::succeeded(
                    job,
                    title,
                    metadata.total_pages.unwrap_or(0),
                    metadata.author,
                    metadata.publisher,
                )),
                _ => Err(LookupError::Incomplete("title")),
            },
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LookupError::Timeout(self.lookup_timeout)),
        };

        match result {
            Ok(event) => {
                tracing::info!("{}", event.description());
                event
            }
            Err(e) => {
                tracing::warn!("Metadata lookup for book {} ({}) failed: {}", job.book_id, job.isbn, e);
                MetadataFetchedEvent::failed(job, e.to_string())
            }
        }
    }

    /// Process one job: look it up, then publish the result.
    ///
    /// Returns only after the publish succeeded; the caller acks on `Ok`.
    pub async fn process(&self, job: &MetadataFetchJob) -> Result<MetadataFetchedEvent, WorkerError> {
        let event = self.fetch(job).await;
        self.bus
            .publish_result(&event)
            .await
            .map_err(|source| WorkerError::Publish {
                book_id: job.book_id,
                source,
            })?;
        Ok(event)
    }

    /// Decode and process one delivery from the job queue.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<JobOutcome, WorkerError> {
        let job: MetadataFetchJob = match serde_json::from_slice(&delivery.body) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!("Discarding undecodable job message: {}", e);
                return Ok(JobOutcome::Discarded);
            }
        };

        if delivery.redelivered {
            tracing::debug!("Job for book {} redelivered", job.book_id);
        }

        self.process(&job).await.map(JobOutcome::Published)
    }
}
