#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{MetadataWorker, ResultConsumer};
use book_core::{Book, BookId, MetadataFetchedEvent, NewBook};
use book_metadata::{BookMetadata, LookupError, LookupFuture, MetadataProvider};
use broker::{Broker, Delivery, EventBus, FnHandler, HandlerFuture, InMemoryBroker, JobQueue, QueueSpec};
use db::{BookRepository, BookStore, DbConfig, DbError, StoreFuture};
use realtime::{HubConfig, NotificationHub};
use tokio::sync::mpsc;

/// How a fake lookup behaves.
#[derive(Clone)]
pub enum Lookup {
    Found(BookMetadata),
    NotFound,
    /// Respond after the delay.
    Slow(Duration, BookMetadata),
    /// Never respond.
    Hang,
}

/// Metadata provider answering from a table. Unknown ISBNs are not found.
#[derive(Default)]
pub struct FakeProvider {
    answers: std::sync::Mutex<HashMap<String, Vec<Lookup>>>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer `isbn` with `lookups` in order; the last one repeats.
    pub fn answer(&self, isbn: &str, lookups: Vec<Lookup>) {
        self.answers.lock().unwrap().insert(isbn.to_string(), lookups);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self, isbn: &str) -> Lookup {
        let mut answers = self.answers.lock().unwrap();
        match answers.get_mut(isbn) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue.first().cloned().unwrap_or(Lookup::NotFound),
            None => Lookup::NotFound,
        }
    }
}

impl MetadataProvider for FakeProvider {
    fn lookup<'a>(&'a self, isbn: &'a str) -> LookupFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.next(isbn);
        Box::pin(async move {
            match next {
                Lookup::Found(metadata) => Ok(metadata),
                Lookup::NotFound => Err(LookupError::NotFound),
                Lookup::Slow(delay, metadata) => {
                    tokio::time::sleep(delay).await;
                    Ok(metadata)
                }
                Lookup::Hang => std::future::pending().await,
            }
        })
    }
}

/// Store wrapper whose first `n` updates fail.
pub struct FlakyStore {
    inner: BookRepository,
    failing_updates: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: BookRepository, failing_updates: usize) -> Self {
        Self {
            inner,
            failing_updates: AtomicUsize::new(failing_updates),
        }
    }
}

impl BookStore for FlakyStore {
    fn create(&self, book: NewBook) -> StoreFuture<'_, Book> {
        self.inner.create(book)
    }

    fn get(&self, id: BookId) -> StoreFuture<'_, Book> {
        self.inner.get(id)
    }

    fn update<'a>(&'a self, book: &'a Book) -> StoreFuture<'a, Book> {
        let fail = self
            .failing_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Box::pin(async { Err(DbError::Query("database unavailable".into())) });
        }
        self.inner.update(book)
    }
}

pub fn clean_code() -> BookMetadata {
    BookMetadata::new("9780000000001")
        .with_title("Foo")
        .with_total_pages(200)
        .with_author("Jane Doe")
}

/// Everything a pipeline test needs, wired to in-memory collaborators.
pub struct Harness {
    pub broker: InMemoryBroker,
    pub jobs: JobQueue,
    pub bus: EventBus,
    pub provider: Arc<FakeProvider>,
    pub repo: BookRepository,
    pub hub: Arc<NotificationHub>,
}

impl Harness {
    pub async fn new() -> Result<Self, DbError> {
        let broker = InMemoryBroker::new();
        let shared: Arc<dyn Broker> = Arc::new(broker.clone());
        let db = db::connect(DbConfig::memory()).await?;

        Ok(Self {
            jobs: JobQueue::new(shared.clone()),
            bus: EventBus::new(shared),
            broker,
            provider: FakeProvider::new(),
            repo: BookRepository::new(db),
            hub: NotificationHub::new(HubConfig::default()),
        })
    }

    pub fn worker(&self, lookup_timeout: Duration) -> Arc<MetadataWorker> {
        Arc::new(
            MetadataWorker::new(self.provider.clone(), self.bus.clone())
                .with_lookup_timeout(lookup_timeout),
        )
    }

    pub fn consumer(&self) -> Arc<ResultConsumer> {
        self.consumer_with(Arc::new(self.repo.clone()))
    }

    pub fn consumer_with(&self, store: Arc<dyn BookStore>) -> Arc<ResultConsumer> {
        Arc::new(ResultConsumer::new(store, self.hub.clone()))
    }

    /// Bind an extra queue to the result events, as an independent
    /// downstream consumer would, and collect everything it receives.
    pub async fn tap_results(
        &self,
        name: &str,
    ) -> Result<(broker::Subscription, mpsc::UnboundedReceiver<MetadataFetchedEvent>), broker::BrokerError>
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let spec = QueueSpec::durable(name).bound_to(
            book_core::BOOK_EVENTS_EXCHANGE,
            book_core::METADATA_FETCHED_ROUTING_KEY,
        );
        let handler = Arc::new(FnHandler::new(move |delivery: Delivery| -> HandlerFuture {
            if let Ok(event) = serde_json::from_slice::<MetadataFetchedEvent>(&delivery.body) {
                let _ = tx.send(event);
            }
            Box::pin(async { Ok(()) })
        }));
        let sub = self.broker.subscribe(&spec, handler).await?;
        Ok((sub, rx))
    }
}

pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
