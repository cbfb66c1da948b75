//! Handle to a running consumer.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A background consumer task plus its cancellation signal.
///
/// Dropping the handle signals the task to stop after the message it is
/// currently processing; use [`Subscription::cancel`] to also wait for it.
pub struct Subscription {
    queue: String,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(queue: impl Into<String>, shutdown: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self {
            queue: queue.into(),
            shutdown,
            task: Some(task),
        }
    }

    /// Name of the consumed queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Whether the consumer task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Stop consuming and wait for the task to exit.
    ///
    /// A message already handed to the handler runs to completion and is
    /// settled before the task exits.
    pub async fn cancel(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::warn!("Consumer for {} panicked: {}", self.queue, e);
        }
        tracing::debug!("Consumer for {} cancelled", self.queue);
    }

    /// Kill the task immediately, without letting an in-flight message
    /// finish. Unacked messages go back on the queue.
    pub async fn abort(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("queue", &self.queue)
            .field("finished", &self.is_finished())
            .finish()
    }
}
