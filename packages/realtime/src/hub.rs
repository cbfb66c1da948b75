//! The notification hub and its subscriber handles.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use ulid::Ulid;

use crate::Frame;

/// Opaque identifier of a live subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Ulid);

impl SubscriberId {
    fn new() -> Self {
        Self(Ulid::new())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames buffered per subscriber before new ones are dropped.
    pub outbox_capacity: usize,
    /// How often an idle stream writes a heartbeat.
    pub keepalive_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 10,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

impl HubConfig {
    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity.max(1);
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("notification hub is shutting down")]
    ShuttingDown,

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Default)]
struct Subscribers {
    closed: bool,
    outboxes: HashMap<SubscriberId, mpsc::Sender<Frame>>,
}

/// Fans broadcast frames out to every registered subscriber.
///
/// Lifecycle is `new` → serve → [`NotificationHub::shutdown`]. Shared as
/// `Arc<NotificationHub>`.
pub struct NotificationHub {
    config: HubConfig,
    subscribers: RwLock<Subscribers>,
}

impl NotificationHub {
    /// A zero outbox capacity is raised to one.
    pub fn new(mut config: HubConfig) -> Arc<Self> {
        config.outbox_capacity = config.outbox_capacity.max(1);
        Arc::new(Self {
            config,
            subscribers: RwLock::new(Subscribers::default()),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Subscribers> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Subscribers> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber with a fresh bounded outbox.
    pub fn register(self: &Arc<Self>) -> Result<SubscriberHandle, HubError> {
        let (tx, rx) = mpsc::channel(self.config.outbox_capacity);
        let id = SubscriberId::new();

        let mut subscribers = self.write();
        if subscribers.closed {
            return Err(HubError::ShuttingDown);
        }
        subscribers.outboxes.insert(id, tx);
        let count = subscribers.outboxes.len();
        drop(subscribers);

        tracing::info!("Subscriber {} registered ({} live)", id, count);
        Ok(SubscriberHandle {
            id,
            outbox: rx,
            hub: Arc::downgrade(self),
        })
    }

    /// Remove a subscriber. Its outbox closes in the same critical section,
    /// so no later broadcast can reach it. Returns false if it was not
    /// registered.
    pub fn deregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.write();
        // Dropping the sender here closes the outbox.
        let removed = subscribers.outboxes.remove(&id).is_some();
        let count = subscribers.outboxes.len();
        drop(subscribers);

        if removed {
            tracing::info!("Subscriber {} deregistered ({} live)", id, count);
        }
        removed
    }

    /// Send `payload` as a `event_type` frame to every subscriber.
    ///
    /// Serializes once and never waits: a subscriber whose outbox is full
    /// misses this frame but stays connected.
    pub fn broadcast<T>(&self, event_type: &str, payload: &T) -> Result<BroadcastReport, HubError>
    where
        T: Serialize + ?Sized,
    {
        let frame = Frame::new(event_type, serde_json::to_string(payload)?);
        Ok(self.broadcast_frame(&frame))
    }

    pub fn broadcast_frame(&self, frame: &Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let subscribers = self.read();

        for (id, outbox) in &subscribers.outboxes {
            match outbox.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Outbox of subscriber {} full, dropped {}", id, frame.event);
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Outbox of subscriber {} already closed", id);
                    report.dropped += 1;
                }
            }
        }
        drop(subscribers);

        tracing::debug!(
            "Broadcast {}: {} delivered, {} dropped",
            frame.event,
            report.delivered,
            report.dropped
        );
        report
    }

    /// Close every outbox and reject further registrations. Streams end
    /// once they have drained what is already buffered.
    pub fn shutdown(&self) {
        let mut subscribers = self.write();
        subscribers.closed = true;
        let closed = subscribers.outboxes.len();
        subscribers.outboxes.clear();
        drop(subscribers);

        tracing::info!("Notification hub shut down, closed {} streams", closed);
    }

    pub fn is_shut_down(&self) -> bool {
        self.read().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.read().outboxes.len()
    }
}

/// A registered subscriber's receiving end.
///
/// Dropping the handle deregisters the subscriber.
pub struct SubscriberHandle {
    id: SubscriberId,
    outbox: mpsc::Receiver<Frame>,
    hub: Weak<NotificationHub>,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next frame, or `None` once the outbox is closed and drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbox.recv().await
    }

    /// A buffered frame, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.outbox.try_recv().ok()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.deregister(self.id);
        }
    }
}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHandle").field("id", &self.id).finish()
    }
}
