//! Broker handlers that run worker and consumer logic.
//!
//! The broker acks when a handler returns `Ok` and nacks with requeue on
//! `Err`. Outcomes, and a subscription stopping on its own, are reported to
//! the owning actor when there is one.

use std::sync::Arc;

use broker::{Delivery, HandlerFuture, MessageHandler};
use ractor::ActorRef;

use crate::consumer::ResultConsumer;
use crate::messages::{ConsumerMessage, WorkerMessage};
use crate::worker::MetadataWorker;

/// Job queue handler backed by a [`MetadataWorker`].
pub struct WorkerHandler {
    worker: Arc<MetadataWorker>,
    reporter: Option<ActorRef<WorkerMessage>>,
}

impl WorkerHandler {
    pub fn new(worker: Arc<MetadataWorker>) -> Self {
        Self {
            worker,
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, actor: ActorRef<WorkerMessage>) -> Self {
        self.reporter = Some(actor);
        self
    }
}

impl MessageHandler for WorkerHandler {
    fn handle(&self, delivery: Delivery) -> HandlerFuture {
        let worker = self.worker.clone();
        let reporter = self.reporter.clone();

        Box::pin(async move {
            let outcome = worker.handle_delivery(&delivery).await.map_err(|e| {
                tracing::warn!("{}", e);
                e.to_string()
            })?;
            if let Some(actor) = reporter {
                // The actor may already be stopping; the message is still settled.
                let _ = actor.send_message(WorkerMessage::Processed(outcome));
            }
            Ok(())
        })
    }

    fn closed(&self, reason: &str) {
        if let Some(actor) = &self.reporter {
            let _ = actor.send_message(WorkerMessage::SubscriptionLost(reason.to_string()));
        }
    }
}

/// Results queue handler backed by a [`ResultConsumer`].
pub struct ConsumerHandler {
    consumer: Arc<ResultConsumer>,
    reporter: Option<ActorRef<ConsumerMessage>>,
}

impl ConsumerHandler {
    pub fn new(consumer: Arc<ResultConsumer>) -> Self {
        Self {
            consumer,
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, actor: ActorRef<ConsumerMessage>) -> Self {
        self.reporter = Some(actor);
        self
    }
}

impl MessageHandler for ConsumerHandler {
    fn handle(&self, delivery: Delivery) -> HandlerFuture {
        let consumer = self.consumer.clone();
        let reporter = self.reporter.clone();

        Box::pin(async move {
            let outcome = consumer.handle_delivery(&delivery).await.map_err(|e| {
                tracing::warn!("{}", e);
                e.to_string()
            })?;
            if let Some(actor) = reporter {
                let _ = actor.send_message(ConsumerMessage::Processed(outcome));
            }
            Ok(())
        })
    }

    fn closed(&self, reason: &str) {
        if let Some(actor) = &self.reporter {
            let _ = actor.send_message(ConsumerMessage::SubscriptionLost(reason.to_string()));
        }
    }
}
