//! Message handler trait.

use std::future::Future;
use std::pin::Pin;

use crate::Delivery;

/// Result type for message handlers. `Err` nacks and requeues.
pub type HandlerResult = Result<(), String>;

/// Future type for async message handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for message handlers.
///
/// Implement this trait to define how messages consumed from a queue are
/// processed. The broker acks only after the returned future resolves to
/// `Ok`.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, delivery: Delivery) -> HandlerFuture;

    /// Called once when the consumer stops on its own, for example because
    /// the broker connection was lost. Not called after a cancel or abort.
    fn closed(&self, _reason: &str) {}
}

/// A simple function-based message handler.
pub struct FnHandler<F>
where
    F: Fn(Delivery) -> HandlerFuture + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Delivery) -> HandlerFuture + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(Delivery) -> HandlerFuture + Send + Sync + 'static,
{
    fn handle(&self, delivery: Delivery) -> HandlerFuture {
        (self.handler)(delivery)
    }
}
