//! In-process broker.
//!
//! Queues live for the lifetime of the broker value and behave like durable
//! AMQP queues from the consumers' point of view:
//! - every message goes to exactly one consumer at a time (competing consumers)
//! - each subscription holds at most one unacked message
//! - a nacked message goes back to the front of its queue, flagged redelivered
//! - a message whose consumer dies before acking is requeued the same way
//!
//! Topic exchanges route by exact routing key match. Publishing to a topic
//! with no bound queue silently drops the message.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, watch};

use crate::{
    Broker, BrokerError, BrokerFuture, Delivery, Destination, MessageHandler, QueueSpec,
    Subscription, TopicBinding,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    redelivered: bool,
}

/// A single durable queue.
#[derive(Default)]
struct MemoryQueue {
    ready: Mutex<VecDeque<StoredMessage>>,
    unacked: AtomicUsize,
    notify: Notify,
}

impl MemoryQueue {
    fn push(&self, message: StoredMessage) {
        lock(&self.ready).push_back(message);
        self.notify.notify_one();
    }

    fn requeue(&self, mut message: StoredMessage) {
        message.redelivered = true;
        lock(&self.ready).push_front(message);
        self.notify.notify_one();
    }

    fn try_take(&self) -> Option<StoredMessage> {
        let mut ready = lock(&self.ready);
        let message = ready.pop_front()?;
        self.unacked.fetch_add(1, Ordering::SeqCst);
        if !ready.is_empty() {
            // Hand the leftover permit to another waiting consumer.
            self.notify.notify_one();
        }
        Some(message)
    }

    /// Wait for the next message. Cancel safe: nothing is taken off the
    /// queue unless this future returns.
    async fn next(&self) -> StoredMessage {
        loop {
            let notified = self.notify.notified();
            if let Some(message) = self.try_take() {
                return message;
            }
            notified.await;
        }
    }

    fn ready_len(&self) -> usize {
        lock(&self.ready).len()
    }
}

/// A message handed to a handler and not yet settled.
///
/// Dropping it without settling requeues the message, which covers both a
/// panicking handler and an aborted consumer task.
struct InFlight {
    queue: Arc<MemoryQueue>,
    message: Option<StoredMessage>,
}

impl InFlight {
    fn ack(mut self) {
        if self.message.take().is_some() {
            self.queue.unacked.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn nack(mut self) {
        if let Some(message) = self.message.take() {
            self.queue.unacked.fetch_sub(1, Ordering::SeqCst);
            self.queue.requeue(message);
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(message) = self.message.take() {
            self.queue.unacked.fetch_sub(1, Ordering::SeqCst);
            self.queue.requeue(message);
        }
    }
}

struct BrokerState {
    queues: Mutex<HashMap<String, Arc<MemoryQueue>>>,
    bindings: Mutex<HashMap<TopicBinding, HashSet<String>>>,
    closed: AtomicBool,
    publish_failures: AtomicUsize,
    next_tag: AtomicU64,
    /// Bumped on every simulated connection loss.
    connection: watch::Sender<u64>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            queues: Mutex::default(),
            bindings: Mutex::default(),
            closed: AtomicBool::new(false),
            publish_failures: AtomicUsize::new(0),
            next_tag: AtomicU64::new(0),
            connection: watch::channel(0).0,
        }
    }
}

/// In-memory broker for tests and single-process deployments.
///
/// Cheap to clone; clones share the same queues.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the queue (and binding) described by `spec` if absent.
    pub fn declare(&self, spec: &QueueSpec) {
        self.queue(&spec.name);
        if let Some(binding) = &spec.binding {
            lock(&self.state.bindings)
                .entry(binding.clone())
                .or_default()
                .insert(spec.name.clone());
        }
    }

    /// Simulate a dropped connection: every later publish or subscribe fails.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }

    /// Undo [`close`](Self::close): publishes and subscribes work again.
    pub fn reopen(&self) {
        self.state.closed.store(false, Ordering::SeqCst);
    }

    /// Simulate a connection loss that the broker recovers from: every running
    /// consumer stops after settling its in-flight message and reports it
    /// through [`MessageHandler::closed`]. Queues and later subscriptions are
    /// unaffected.
    pub fn disconnect_consumers(&self) {
        self.state.connection.send_modify(|generation| *generation += 1);
    }

    /// Make the next `count` publishes fail with a transient error.
    pub fn inject_publish_failures(&self, count: usize) {
        self.state.publish_failures.store(count, Ordering::SeqCst);
    }

    /// Messages waiting for a consumer.
    pub fn ready_count(&self, queue: &str) -> usize {
        lock(&self.state.queues)
            .get(queue)
            .map_or(0, |q| q.ready_len())
    }

    /// Messages delivered and not yet acked.
    pub fn unacked_count(&self, queue: &str) -> usize {
        lock(&self.state.queues)
            .get(queue)
            .map_or(0, |q| q.unacked.load(Ordering::SeqCst))
    }

    fn queue(&self, name: &str) -> Arc<MemoryQueue> {
        lock(&self.state.queues)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn check_open(&self) -> Result<(), BrokerError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.state
            .publish_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn route(&self, destination: &Destination, body: Vec<u8>) {
        let message = StoredMessage {
            body,
            redelivered: false,
        };

        match destination {
            Destination::Queue(name) => self.queue(name).push(message),
            Destination::Topic {
                exchange,
                routing_key,
            } => {
                let key = TopicBinding {
                    exchange: exchange.clone(),
                    routing_key: routing_key.clone(),
                };
                let bound: Vec<String> = lock(&self.state.bindings)
                    .get(&key)
                    .map(|queues| queues.iter().cloned().collect())
                    .unwrap_or_default();

                if bound.is_empty() {
                    tracing::debug!("No queue bound to {}, message dropped", destination);
                }
                for name in bound {
                    self.queue(&name).push(message.clone());
                }
            }
        }
    }
}

impl Broker for InMemoryBroker {
    fn publish<'a>(&'a self, destination: &'a Destination, body: Vec<u8>) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            self.check_open()?;
            if self.take_injected_failure() {
                return Err(BrokerError::Publish(format!(
                    "channel failure publishing to {}",
                    destination
                )));
            }
            self.route(destination, body);
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        spec: &'a QueueSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> BrokerFuture<'a, Subscription> {
        Box::pin(async move {
            self.check_open()?;
            self.declare(spec);

            let queue = self.queue(&spec.name);
            let state = self.state.clone();
            let name = spec.name.clone();
            let (shutdown, mut shutdown_rx) = watch::channel(false);
            let mut connection = state.connection.subscribe();

            let task = tokio::spawn(async move {
                loop {
                    let message = tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => break,
                        _ = connection.changed() => {
                            tracing::warn!("Consumer on {} lost its connection", name);
                            handler.closed("connection lost");
                            break;
                        }
                        message = queue.next() => message,
                    };

                    let delivery = Delivery {
                        body: message.body.clone(),
                        redelivered: message.redelivered,
                        delivery_tag: state.next_tag.fetch_add(1, Ordering::SeqCst) + 1,
                    };
                    let in_flight = InFlight {
                        queue: queue.clone(),
                        message: Some(message),
                    };

                    match handler.handle(delivery).await {
                        Ok(()) => in_flight.ack(),
                        Err(reason) => {
                            tracing::warn!("Message on {} nacked for redelivery: {}", name, reason);
                            in_flight.nack();
                        }
                    }
                }
            });

            Ok(Subscription::new(spec.name.clone(), shutdown, task))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{BrokerExt, FnHandler, HandlerFuture};

    /// Handler that forwards every delivery to a channel and applies `outcome`.
    fn recording_handler(
        tx: mpsc::UnboundedSender<Delivery>,
        outcome: impl Fn(&Delivery) -> Result<(), String> + Send + Sync + 'static,
    ) -> Arc<dyn MessageHandler> {
        Arc::new(FnHandler::new(move |delivery: Delivery| -> HandlerFuture {
            let result = outcome(&delivery);
            let _ = tx.send(delivery);
            Box::pin(async move { result })
        }))
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Option<Delivery> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .ok()
            .flatten()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_acked_message_is_removed() -> Result<(), BrokerError> {
        let broker = InMemoryBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let spec = QueueSpec::durable("jobs");

        let sub = broker.subscribe(&spec, recording_handler(tx, |_| Ok(()))).await?;
        broker
            .publish_json(&Destination::queue("jobs"), &serde_json::json!({"n": 1}))
            .await?;

        let delivery = recv(&mut rx).await.expect("delivery");
        assert!(!delivery.redelivered);
        settle().await;
        assert_eq!(broker.ready_count("jobs"), 0);
        assert_eq!(broker.unacked_count("jobs"), 0);

        sub.cancel().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_nacked_message_is_redelivered() -> Result<(), BrokerError> {
        let broker = InMemoryBroker::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let spec = QueueSpec::durable("jobs");

        // Fail the first attempt only.
        let handler = recording_handler(tx, |d| {
            if d.redelivered {
                Ok(())
            } else {
                Err("transient".into())
            }
        });
        let sub = broker.subscribe(&spec, handler).await?;
        broker.publish(&Destination::queue("jobs"), b"job".to_vec()).await?;

        let first = recv(&mut rx).await.expect("first delivery");
        let second = recv(&mut rx).await.expect("redelivery");
        assert!(!first.redelivered);
        assert!(second.redelivered);
        assert_eq!(second.body, b"job".to_vec());

        settle().await;
        assert_eq!(broker.ready_count("jobs"), 0);
        sub.cancel().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_aborted_consumer_requeues_in_flight_message() -> Result<(), BrokerError> {
        let broker = InMemoryBroker::new();
        let spec = QueueSpec::durable("jobs");

        // A consumer that never finishes its message, like a crashed worker.
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let stuck = Arc::new(FnHandler::new(move |delivery: Delivery| -> HandlerFuture {
            let _ = started_tx.send(delivery);
            Box::pin(std::future::pending::<crate::HandlerResult>())
        }));
        let sub = broker.subscribe(&spec, stuck).await?;
        broker.publish(&Destination::queue("jobs"), b"job".to_vec()).await?;
        recv(&mut started_rx).await.expect("picked up");
        assert_eq!(broker.unacked_count("jobs"), 1);

        sub.abort().await;
        assert_eq!(broker.unacked_count("jobs"), 0);
        assert_eq!(broker.ready_count("jobs"), 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = broker.subscribe(&spec, recording_handler(tx, |_| Ok(()))).await?;
        let redelivered = recv(&mut rx).await.expect("redelivery");
        assert!(redelivered.redelivered);

        sub.cancel().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_competing_consumers_share_messages() -> Result<(), BrokerError> {
        let broker = InMemoryBroker::new();
        let spec = QueueSpec::durable("jobs");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let a = broker
            .subscribe(&spec, recording_handler(tx.clone(), |_| Ok(())))
            .await?;
        let b = broker.subscribe(&spec, recording_handler(tx, |_| Ok(()))).await?;

        for i in 0..20u8 {
            broker.publish(&Destination::queue("jobs"), vec![i]).await?;
        }

        let mut seen = Vec::new();
        for _ in 0..20 {
            seen.push(recv(&mut rx).await.expect("delivery").body[0]);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20u8).collect::<Vec<_>>());

        // Nothing is delivered twice.
        settle().await;
        assert!(rx.try_recv().is_err());

        a.cancel().await;
        b.cancel().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_topic_routes_to_every_bound_queue() -> Result<(), BrokerError> {
        let broker = InMemoryBroker::new();
        broker.declare(&QueueSpec::durable("api").bound_to("book_events", "book.metadata_fetched"));
        broker.declare(
            &QueueSpec::durable("analytics").bound_to("book_events", "book.metadata_fetched"),
        );
        broker.declare(&QueueSpec::durable("other").bound_to("book_events", "book.created"));

        broker
            .publish(
                &Destination::topic("book_events", "book.metadata_fetched"),
                b"{}".to_vec(),
            )
            .await?;

        assert_eq!(broker.ready_count("api"), 1);
        assert_eq!(broker.ready_count("analytics"), 1);
        assert_eq!(broker.ready_count("other"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unbound_topic_publish_succeeds() -> Result<(), BrokerError> {
        let broker = InMemoryBroker::new();
        broker
            .publish(&Destination::topic("book_events", "nobody.listens"), b"{}".to_vec())
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_injected_and_closed_failures() {
        let broker = InMemoryBroker::new();
        let dest = Destination::queue("jobs");

        broker.inject_publish_failures(1);
        assert!(matches!(
            broker.publish(&dest, b"a".to_vec()).await,
            Err(BrokerError::Publish(_))
        ));
        assert!(broker.publish(&dest, b"b".to_vec()).await.is_ok());

        broker.close();
        assert!(matches!(
            broker.publish(&dest, b"c".to_vec()).await,
            Err(BrokerError::Closed)
        ));
        assert_eq!(broker.ready_count("jobs"), 1);

        broker.reopen();
        assert!(broker.publish(&dest, b"d".to_vec()).await.is_ok());
        assert_eq!(broker.ready_count("jobs"), 2);
    }

    #[tokio::test]
    async fn test_cancelled_subscription_stops_consuming() -> Result<(), BrokerError> {
        let broker = InMemoryBroker::new();
        let spec = QueueSpec::durable("jobs");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = broker.subscribe(&spec, recording_handler(tx, |_| Ok(()))).await?;
        sub.cancel().await;

        broker.publish(&Destination::queue("jobs"), b"late".to_vec()).await?;
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(broker.ready_count("jobs"), 1);
        Ok(())
    }

    /// Counts `closed` calls and acks everything.
    #[derive(Default)]
    struct ClosingHandler {
        closed: std::sync::Mutex<Vec<String>>,
    }

    impl MessageHandler for ClosingHandler {
        fn handle(&self, _delivery: Delivery) -> HandlerFuture {
            Box::pin(async { Ok(()) })
        }

        fn closed(&self, reason: &str) {
            self.closed.lock().unwrap().push(reason.to_string());
        }
    }

    #[tokio::test]
    async fn test_lost_connection_stops_consumer_and_reports_it() -> Result<(), BrokerError> {
        let broker = InMemoryBroker::new();
        let spec = QueueSpec::durable("jobs");

        let lost = Arc::new(ClosingHandler::default());
        let sub = broker.subscribe(&spec, lost.clone()).await?;
        let cancelled = Arc::new(ClosingHandler::default());
        let other = broker.subscribe(&spec, cancelled.clone()).await?;
        other.cancel().await;

        broker.disconnect_consumers();
        settle().await;
        assert!(sub.is_finished());
        assert_eq!(*lost.closed.lock().unwrap(), vec!["connection lost".to_string()]);
        assert!(cancelled.closed.lock().unwrap().is_empty());

        // The queue survives and a new consumer picks up where the old one stopped.
        broker.publish(&Destination::queue("jobs"), b"after".to_vec()).await?;
        assert_eq!(broker.ready_count("jobs"), 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let resumed = broker.subscribe(&spec, recording_handler(tx, |_| Ok(()))).await?;
        assert_eq!(recv(&mut rx).await.expect("delivery").body, b"after");

        resumed.cancel().await;
        Ok(())
    }
}
