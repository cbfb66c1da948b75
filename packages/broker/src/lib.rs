//! Broker client for the enrichment pipeline.
//!
//! Every component talks to the message broker through the [`Broker`]
//! trait. Delivery is at-least-once: a handler returning `Ok` acks the
//! message, anything else (an `Err`, a panic, the consumer task dying)
//! puts the message back on its queue. No consumer may assume a message
//! arrives exactly once.
//!
//! # Implementations
//!
//! - [`InMemoryBroker`] - in-process queues and topic exchanges, used in
//!   tests and single-process deployments
//! - `AmqpBroker` - RabbitMQ via `lapin` (feature `amqp`)
//!
//! # Usage
//!
//! ```ignore
//! use broker::{BrokerExt, Destination, InMemoryBroker};
//!
//! let broker = InMemoryBroker::new();
//! broker.publish_json(&Destination::queue("metadata_fetch"), &job).await?;
//! ```

#[cfg(feature = "amqp")]
mod amqp;
mod channels;
mod error;
mod handler;
mod memory;
mod message;
mod subscription;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
pub use channels::{EventBus, JobQueue};
pub use error::BrokerError;
pub use handler::{FnHandler, HandlerFuture, HandlerResult, MessageHandler};
pub use memory::InMemoryBroker;
pub use message::{Delivery, Destination, QueueSpec, TopicBinding};
pub use subscription::Subscription;

/// Future returned by broker operations.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// A durable message broker connection.
pub trait Broker: Send + Sync + 'static {
    /// Publish a persistent message.
    ///
    /// Fails only when the connection or channel fails, never because no
    /// consumer is listening.
    fn publish<'a>(&'a self, destination: &'a Destination, body: Vec<u8>) -> BrokerFuture<'a, ()>;

    /// Declare the queue described by `spec` (and its binding) if absent,
    /// then consume it one message at a time in a background task.
    fn subscribe<'a>(
        &'a self,
        spec: &'a QueueSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> BrokerFuture<'a, Subscription>;
}

/// Typed publishing on top of [`Broker`].
pub trait BrokerExt: Broker {
    /// Serialize `payload` as JSON and publish it.
    fn publish_json<'a, T>(&'a self, destination: &'a Destination, payload: &T) -> BrokerFuture<'a, ()>
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_vec(payload) {
            Ok(body) => self.publish(destination, body),
            Err(e) => Box::pin(async move { Err(BrokerError::Serialization(e)) }),
        }
    }
}

impl<B: Broker + ?Sized> BrokerExt for B {}
