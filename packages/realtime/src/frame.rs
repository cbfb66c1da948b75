//! Wire frames for `text/event-stream`.

use std::sync::Arc;

/// Heartbeat comment written when no event fired for a keepalive interval.
pub const KEEPALIVE: &str = ":keepalive\n\n";

/// One server-sent event. The payload is serialized once per broadcast and
/// shared by every outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: Arc<str>,
    pub data: Arc<str>,
}

impl Frame {
    pub fn new(event: impl Into<Arc<str>>, data: impl Into<Arc<str>>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// `event: <type>\ndata: <json>\n\n`
    pub fn encode(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}
