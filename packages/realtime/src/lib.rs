//! Live notification fan-out.
//!
//! A [`NotificationHub`] owns every live subscriber's bounded outbox.
//! Broadcasts never block on a slow subscriber: when an outbox is full the
//! frame is dropped for that subscriber only.

mod frame;
mod hub;

pub use frame::{Frame, KEEPALIVE};
pub use hub::{BroadcastReport, HubConfig, HubError, NotificationHub, SubscriberHandle, SubscriberId};
